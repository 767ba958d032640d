//! The update run: load the configuration, rebuild every requested
//! group's grid, upload each one next to the configuration document.

use std::sync::Arc;

use resultgrid_core::{
    update_group, write_grid, Configuration, GroupOptions, TestGroup, UpdateError, UpdateResult,
    PROD_BUCKET,
};
use resultgrid_store::{GcsPath, ObjectClient};
use tracing::{debug, info, warn};

use crate::args::Args;

pub async fn run(args: Args) -> UpdateResult<()> {
    let client = Arc::new(ObjectClient::gcs());
    run_with_client(&client, &args).await
}

/// Validate the flag surface before any network traffic.
fn validate(args: &Args) -> UpdateResult<GcsPath> {
    let config_path = GcsPath::parse(&args.config)?;
    if config_path.bucket() == PROD_BUCKET {
        return Err(UpdateError::Config {
            message: format!("config bucket {PROD_BUCKET} is disallowed"),
        });
    }
    if !args.gcp_service_account.is_empty() {
        return Err(UpdateError::Config {
            message: "--gcp-service-account is not supported yet".to_string(),
        });
    }
    if args.confirm {
        debug!("--confirm is reserved and has no effect yet");
    }
    Ok(config_path)
}

pub async fn run_with_client(client: &Arc<ObjectClient>, args: &Args) -> UpdateResult<()> {
    let config_path = validate(args)?;
    let buf = client
        .get(&config_path, None)
        .await
        .map_err(UpdateError::from)?;
    let configuration = Configuration::from_json(&buf)?;

    let groups: Vec<&TestGroup> = match &args.test_group {
        Some(name) => vec![configuration.group(name).ok_or_else(|| UpdateError::Config {
            message: format!("test group {name} not found in {config_path}"),
        })?],
        None => configuration.test_groups.iter().collect(),
    };
    if groups.is_empty() {
        warn!(config = %config_path, "no test groups configured");
    }

    let opts = GroupOptions {
        group_concurrency: args.group_concurrency,
        build_concurrency: args.build_concurrency,
        ..GroupOptions::default()
    };

    for group in groups {
        info!(group = %group.name, "updating test group");
        let grid = update_group(client, group, &opts).await?;
        let output = GcsPath::from_parts(config_path.bucket(), &group.name);
        let output_name = output.to_string();
        let crc = write_grid(client, &output, &grid, &|written, total| {
            debug!(output = %output_name, written, total, "uploading grid");
        })
        .await?;
        info!(
            group = %group.name,
            output = %output,
            columns = grid.columns.len(),
            rows = grid.rows.len(),
            crc32c = crc,
            "updated grid"
        );
    }
    Ok(())
}
