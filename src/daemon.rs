//! Daemon lifetime: the HTTP facade, the FUSE mount, and signal-driven
//! shutdown.

use std::sync::Arc;

use tokio::select;
use tracing::{debug, error, info};

use remotefs::chain::Chain;
use remotefs::fuse::RemoteFsAdapter;
use remotefs::remote::HttpRemoteFs;
use remotefs::server;

use crate::app_config::{self, Config};

mod managed_mount {
    //! fuser only performs a regular unmount when its `BackgroundSession`
    //! drops. We follow up with the platform helper so the kernel forgets the
    //! mount even when something kept the tree busy during shutdown.

    use std::path::PathBuf;
    use std::process::Command;

    use tracing::{debug, warn};

    pub struct ManagedMount {
        mount_point: PathBuf,
    }

    impl ManagedMount {
        pub fn new(mount_point: impl Into<PathBuf>) -> Self {
            Self {
                mount_point: mount_point.into(),
            }
        }
    }

    impl Drop for ManagedMount {
        fn drop(&mut self) {
            debug!(mount_point = %self.mount_point.display(), "confirming unmount");
            match Command::new("fusermount3")
                .arg("-u")
                .arg(&self.mount_point)
                .status()
            {
                Ok(status) if status.success() => debug!("unmounted"),
                Ok(status) => debug!(%status, "fusermount3 -u reported failure (already unmounted?)"),
                Err(e) => warn!(error = %e, "could not run fusermount3"),
            }
        }
    }
}

/// `:8080` binds every interface.
fn bind_addr(server_addr: &str) -> String {
    match server_addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => server_addr.to_owned(),
    }
}

/// The URL the local FUSE client dials for a given bind address.
fn server_url(server_addr: &str) -> String {
    if server_addr.starts_with(':') {
        format!("http://localhost{server_addr}")
    } else {
        format!("http://{server_addr}")
    }
}

/// Prepare the mount point directory: create it if missing, reject it when it
/// already has content (a populated directory usually means a stale mount).
async fn prepare_mount_point(mount_point: &std::path::Path) -> Result<(), std::io::Error> {
    match tokio::fs::read_dir(mount_point).await {
        Ok(mut entries) => {
            if entries.next_entry().await?.is_some() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!(
                        "mount point '{}' already exists and is not empty",
                        mount_point.display()
                    ),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(mount_point).await?;
            info!(path = %mount_point.display(), "created mount point directory");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn wait_for_exit() -> Result<(), std::io::Error> {
    use tokio::signal;

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut sighup = signal::unix::signal(signal::unix::SignalKind::hangup())?;
    select! {
        _ = signal::ctrl_c() => {
            debug!("received Ctrl+C, shutting down");
        },
        _ = sigterm.recv() => {
            debug!("received termination signal, shutting down");
        },
        _ = sighup.recv() => {
            debug!("received hangup signal, shutting down");
        },
    }
    Ok(())
}

/// Main entry point for the daemon.
pub async fn run(config: Config, handle: tokio::runtime::Handle) -> Result<(), std::io::Error> {
    let tiers = app_config::build_tiers(&config).map_err(std::io::Error::other)?;
    let engine = Arc::new(Chain::new(tiers));

    let listener = tokio::net::TcpListener::bind(bind_addr(&config.server_addr)).await?;
    info!(addr = %listener.local_addr()?, "file server listening");
    let app = server::router(Arc::clone(&engine));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "file server failed");
        }
    });

    prepare_mount_point(&config.mount).await?;

    let client = HttpRemoteFs::new(server_url(&config.server_addr)).map_err(std::io::Error::other)?;
    let adapter = RemoteFsAdapter::new(client, handle);

    let mount_opts = [
        fuser::MountOption::FSName("remotefs".to_owned()),
        fuser::MountOption::Subtype("remotefs".to_owned()),
        fuser::MountOption::AllowOther,
        fuser::MountOption::DefaultPermissions,
        fuser::MountOption::AutoUnmount,
    ];

    let mount_guard = managed_mount::ManagedMount::new(&config.mount);
    {
        let _session = fuser::spawn_mount2(adapter, &config.mount, &mount_opts)?;
        info!(
            mount = %config.mount.display(),
            server = %server_url(&config.server_addr),
            "remotefs is running. Press Ctrl+C to stop.",
        );

        wait_for_exit().await?;
    }
    drop(mount_guard);
    Ok(())
}

pub fn spawn(config: Config) -> Result<(), std::io::Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let handle = runtime.handle().clone();
    runtime.block_on(run(config, handle))
}
