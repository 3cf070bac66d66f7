use std::path::Path;

use ltx_media::check_ffmpeg;
use ltx_pipeline::{RemoteClient, RemoteConfig};
use ltx_storage::{SupabaseClient, SupabaseConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let work_dir = std::env::var("WORKER_WORK_DIR").unwrap_or_else(|_| "/tmp/ltx2".to_string());
    println!("worker-selfcheck: starting with work_dir={}", work_dir);

    ensure_workdir(&work_dir).await?;
    let ffmpeg = check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    println!("worker-selfcheck: ffmpeg at {}", ffmpeg.display());
    ensure_env_present(&["SUPABASE_URL", "SUPABASE_SERVICE_ROLE_KEY"])?;

    let storage = SupabaseClient::new(SupabaseConfig::from_env()?)?;
    storage
        .check_connectivity()
        .await
        .map_err(|e| anyhow::anyhow!("storage bucket unreachable: {}", e))?;
    println!("worker-selfcheck: storage bucket {} reachable", storage.bucket());

    // The inference runtime may still be starting; report but don't fail.
    let client = RemoteClient::new(RemoteConfig::from_env())?;
    match client.health_check().await {
        Ok(true) => println!("worker-selfcheck: inference runtime healthy"),
        Ok(false) => println!("worker-selfcheck: inference runtime not ready"),
        Err(e) => println!("worker-selfcheck: inference runtime unreachable: {}", e),
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
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
