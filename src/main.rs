use isolation_router::config::Config;
use isolation_router::runtime::{self, IsolationRuntime};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::load()?;
    runtime::init_tracing(&config.logging);

    let runtime = IsolationRuntime::from_config(&config).await?;

    // 传入的地址逐个解析后退出，否则常驻维持心跳
    let destinations: Vec<String> = std::env::args().skip(1).collect();
    if destinations.is_empty() {
        tokio::signal::ctrl_c().await?;
    } else {
        for destination in destinations {
            match runtime.resolver().resolve(&destination).await {
                Ok(resolved) => println!("{destination} -> {resolved}"),
                Err(e) => eprintln!("{destination} -> error: {e}"),
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}
