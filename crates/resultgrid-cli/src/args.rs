use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "resultgrid",
    version,
    about = "Rebuild test-result grids from CI build artifacts in object storage"
)]
pub struct Args {
    /// Object path of the configuration document (gs://bucket/object)
    #[arg(long)]
    pub config: String,

    /// Service-account credentials file (reserved; must stay empty)
    #[arg(long, default_value = "")]
    pub gcp_service_account: String,

    /// Reserved
    #[arg(long)]
    pub confirm: bool,

    /// Update only the named test group
    #[arg(long)]
    pub test_group: Option<String>,

    /// Concurrent builds per group (0 = 4 x logical CPUs)
    #[arg(long, default_value_t = 0)]
    pub group_concurrency: usize,

    /// Concurrent artifact reads per build (0 = 4 x logical CPUs)
    #[arg(long, default_value_t = 0)]
    pub build_concurrency: usize,
}
