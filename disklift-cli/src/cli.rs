//! Flag surface for the import pipeline.
//!
//! Flags map 1:1 onto [`ImageImportRequest`]; this module builds the
//! request, normalizes and validates it, and emits the normalized form as
//! JSON. Wiring real cloud transports happens in the deployment binary,
//! not here.

use anyhow::{bail, Context};
use clap::Parser;
use disklift::plan::OsRegistry;
use disklift::{EnvironmentSettings, ImageImportRequest, InflationStrategy, Source};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "disklift", about = "Import a virtual disk into a bootable cloud image")]
pub struct ImportArgs {
    /// Name of the image to create
    #[arg(long)]
    pub image_name: String,

    /// Storage path of the source disk file (gs://bucket/object)
    #[arg(long, conflicts_with = "source_image")]
    pub source_file: Option<String>,

    /// URI of an existing image to import from
    #[arg(long)]
    pub source_image: Option<String>,

    /// Import OS identifier (e.g. ubuntu-2004); omit to detect
    #[arg(long, default_value = "")]
    pub os: String,

    /// Custom translation workflow path, bypassing OS detection
    #[arg(long, default_value = "")]
    pub custom_workflow: String,

    #[arg(long, default_value = "")]
    pub family: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Labels applied to created resources, as key=value
    #[arg(long = "label", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,

    #[arg(long)]
    pub uefi_compatible: bool,

    /// Import as a non-bootable data disk
    #[arg(long)]
    pub data_disk: bool,

    /// Bring-your-own-license import
    #[arg(long)]
    pub byol: bool,

    /// Skip guest environment installation during translation
    #[arg(long)]
    pub no_guest_environment: bool,

    /// Run sysprep on Windows guests
    #[arg(long)]
    pub sysprep_windows: bool,

    /// Wall-clock budget for the whole import (e.g. 30m, 2h)
    #[arg(long, default_value = "2h", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Inflation strategy for file sources: shadow-tested or api-failover
    #[arg(long, default_value = "shadow-tested", value_parser = parse_strategy)]
    pub inflation_strategy: InflationStrategy,

    #[arg(long, env = "DISKLIFT_PROJECT")]
    pub project: String,

    #[arg(long, env = "DISKLIFT_ZONE")]
    pub zone: String,

    #[arg(long, default_value = "")]
    pub network: String,

    #[arg(long, default_value = "")]
    pub subnet: String,

    /// Storage path for job scratch artifacts
    #[arg(long)]
    pub scratch_bucket: String,

    /// Service account translation instances run as
    #[arg(long, default_value = "")]
    pub compute_service_account: String,

    /// Directory holding the workflow templates
    #[arg(long, default_value = "workflows")]
    pub workflow_dir: PathBuf,

    /// Strip external IPs from every created instance
    #[arg(long)]
    pub no_external_ip: bool,

    /// Execution id; generated when omitted
    #[arg(long, default_value = "")]
    pub execution_id: String,
}

impl ImportArgs {
    fn into_request(self) -> anyhow::Result<ImageImportRequest> {
        let source = match (self.source_file, self.source_image) {
            (Some(path), None) => Some(Source::file(&path).context("invalid --source-file")?),
            (None, Some(uri)) => Some(Source::image(&uri).context("invalid --source-image")?),
            (None, None) => None,
            (Some(_), Some(_)) => bail!("--source-file and --source-image are mutually exclusive"),
        };
        let execution_id = if self.execution_id.is_empty() {
            uuid::Uuid::new_v4().simple().to_string()
        } else {
            self.execution_id
        };

        Ok(ImageImportRequest {
            execution_id,
            environment: EnvironmentSettings {
                project: self.project,
                zone: self.zone,
                network: self.network,
                subnet: self.subnet,
                scratch_bucket_path: self.scratch_bucket,
                compute_service_account: self.compute_service_account,
                workflow_dir: self.workflow_dir,
                no_external_ip: self.no_external_ip,
            },
            source,
            image_name: self.image_name,
            family: self.family,
            description: self.description,
            labels: self.labels,
            os: self.os,
            custom_workflow: self.custom_workflow,
            uefi_compatible: self.uefi_compatible,
            data_disk: self.data_disk,
            byol: self.byol,
            no_guest_environment: self.no_guest_environment,
            sysprep_windows: self.sysprep_windows,
            timeout: self.timeout,
            inflation_strategy: self.inflation_strategy,
        })
    }
}

pub async fn execute(args: ImportArgs) -> anyhow::Result<()> {
    let mut request = args.into_request()?;
    request.fix_byol_and_os();
    request.validate().context("invalid import request")?;

    let registry = OsRegistry::default();
    if !request.os.is_empty() && registry.get(&request.os).is_none() {
        bail!(
            "os `{}` isn't supported for import; supported values: {}",
            request.os,
            registry.supported_ids().join(", ")
        );
    }

    tracing::info!(
        execution_id = %request.execution_id,
        image = %request.image_name,
        "import request accepted"
    );
    let rendered =
        serde_json::to_string_pretty(&request).context("failed to render the request")?;
    println!("{rendered}");
    Ok(())
}

/// Parse a human duration: plain seconds, or a number suffixed with
/// `s`, `m` or `h`.
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (value, scale) = match raw.chars().last() {
        Some('s') => (&raw[..raw.len() - 1], 1),
        Some('m') => (&raw[..raw.len() - 1], 60),
        Some('h') => (&raw[..raw.len() - 1], 3600),
        Some(c) if c.is_ascii_digit() => (raw, 1),
        _ => return Err(format!("invalid duration `{raw}`")),
    };
    let seconds: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration `{raw}`"))?;
    seconds
        .checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration `{raw}` is out of range"))
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("label `{raw}` is not in key=value form")),
    }
}

fn parse_strategy(raw: &str) -> Result<InflationStrategy, String> {
    match raw {
        "shadow-tested" => Ok(InflationStrategy::ShadowTested),
        "api-failover" => Ok(InflationStrategy::ApiFailover),
        other => Err(format!(
            "unknown inflation strategy `{other}`; expected shadow-tested or api-failover"
        )),
    }
}
