use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let resources = [pgadmin_operator::resources::PGAdmin::crd()];

    for resource in resources {
        println!("---");
        print!("{}", serde_yaml::to_string(&resource)?);
    }

    Ok(())
}
