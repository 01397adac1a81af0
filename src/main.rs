#[tokio::main]
async fn main() {
    if let Err(e) = smart_desktop_lib::run().await {
        tracing::error!("SmartDesktop error: {}", e);
        eprintln!("SmartDesktop error: {}", e);
        std::process::exit(1);
    }
}
