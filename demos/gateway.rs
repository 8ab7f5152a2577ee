//
//  Sample gateway server.
//
//  Mounts a local directory at /files and a seeded in-memory scratch
//  mount at /scratch. Listens on plain http; connect with any WebDAV
//  client, e.g. `dav://localhost:4918/` from a file manager.
//

use std::error::Error;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;

use dav_gateway::storage::localdisk::LocalDisk;
use dav_gateway::storage::membackend::MemBackend;
use dav_gateway::{BackendRegistry, DavHandler, FakeLs, GatewayConfig};

#[derive(Debug, clap::Parser)]
#[command(about, version)]
struct Cli {
    /// port to listen on
    #[arg(short, long, default_value = "4918")]
    port: u16,
    /// local directory to serve under /files
    #[arg(short, long)]
    dir: Option<String>,
    /// metadata cache TTL in seconds (0 = default)
    #[arg(long, default_value = "0")]
    cache_ttl: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let registry = Arc::new(BackendRegistry::new());
    if let Some(dir) = &cli.dir {
        let dir = dir.clone();
        registry.register_engine(move || Arc::new(LocalDisk::new("/files", dir)));
    }
    registry.register_engine(|| {
        let mem = MemBackend::new("/scratch");
        mem.add_file("/scratch/readme.txt", &b"scratch space, feel free\n"[..]);
        Arc::new(mem)
    });

    let mut config = GatewayConfig::default();
    config.webdav.metadata_cache_ttl = cli.cache_ttl;

    let handler = DavHandler::builder(registry)
        .config(config)
        .locksystem(FakeLs::new())
        .build();

    // drop long-idle expired cache entries in the background
    let _sweeper = handler
        .metadata_cache()
        .spawn_sweeper(std::time::Duration::from_secs(300));

    let make_service = hyper::service::make_service_fn(move |_| {
        let handler = handler.clone();
        async move {
            let func = move |req| {
                let handler = handler.clone();
                async move {
                    Ok::<_, std::convert::Infallible>(handler.handle(req).await)
                }
            };
            Ok::<_, hyper::Error>(hyper::service::service_fn(func))
        }
    });

    let addr = SocketAddr::from_str(&format!("0.0.0.0:{}", cli.port))?;
    println!("Serving on {}", addr);
    hyper::Server::try_bind(&addr)?.serve(make_service).await?;
    Ok(())
}
