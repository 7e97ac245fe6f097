#[tokio::main]
async fn main() {
    if let Err(e) = squiggles::run().await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}
