use std::path::Path;

use reel_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_tool("ffmpeg", reel_media::check_ffmpeg())?;
    ensure_tool("ffprobe", reel_media::check_ffprobe())?;
    ensure_env_present(&["REDIS_URL", "PROVIDER_GATEWAY_URL"])?;
    ensure_any_env_present(&["GCP_PROJECT_ID", "FIREBASE_PROJECT_ID"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("work dir {} not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_tool(name: &str, found: reel_media::MediaResult<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = found.map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;
    let output = std::process::Command::new(&path).arg("-version").output()?;
    if !output.status.success() {
        return Err(anyhow::anyhow!("{} -version failed: {:?}", name, output.status));
    }
    println!("worker-selfcheck: {} at {}", name, path.display());
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}

fn ensure_any_env_present(vars: &[&str]) -> anyhow::Result<()> {
    if vars.iter().any(|var| std::env::var(var).is_ok()) {
        return Ok(());
    }
    Err(anyhow::anyhow!("missing env var, set one of {}", vars.join(", ")))
}
