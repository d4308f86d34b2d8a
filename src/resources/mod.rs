mod pgadmin;
mod postgres_cluster;

pub use pgadmin::*;
pub use postgres_cluster::*;
