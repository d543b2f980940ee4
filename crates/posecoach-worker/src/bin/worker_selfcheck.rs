use std::path::Path;
use std::process::Command;

use posecoach_ml_client::PoseClient;
use posecoach_storage::R2Client;
use posecoach_worker::WorkerConfig;

const REQUIRED_ENV: &[&str] = &[
    "R2_ENDPOINT_URL",
    "R2_ACCESS_KEY_ID",
    "R2_SECRET_ACCESS_KEY",
    "R2_BUCKET_NAME",
    "GCP_PROJECT_ID",
    "POSE_SERVICE_URL",
    "GEMINI_API_KEY",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_tool("ffmpeg")?;
    ensure_tool("ffprobe")?;
    ensure_env_present(REQUIRED_ENV)?;
    ensure_bucket_reachable().await?;
    ensure_pose_service().await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = tempfile::tempfile_in(path)
        .map_err(|e| anyhow::anyhow!("work dir {} not writable: {}", path.display(), e))?;
    drop(probe);
    Ok(())
}

fn ensure_tool(tool: &str) -> anyhow::Result<()> {
    let output = Command::new(tool)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", tool, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("{} -version failed: {:?}", tool, output.status));
    }
    Ok(())
}

async fn ensure_bucket_reachable() -> anyhow::Result<()> {
    let client = R2Client::from_env()?;
    client.check_connectivity().await?;
    Ok(())
}

async fn ensure_pose_service() -> anyhow::Result<()> {
    let client = PoseClient::from_env()?;
    if !client.health_check().await? {
        return Err(anyhow::anyhow!(
            "pose service at {} is not healthy",
            client.config().base_url
        ));
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    let missing: Vec<&str> = vars
        .iter()
        .copied()
        .filter(|var| std::env::var(var).map(|v| v.trim().is_empty()).unwrap_or(true))
        .collect();

    if !missing.is_empty() {
        return Err(anyhow::anyhow!("missing required env vars: {}", missing.join(", ")));
    }
    Ok(())
}
