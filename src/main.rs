#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = ckdwatch_lib::run().await {
        eprintln!("ckdwatch: {e}");
        std::process::exit(1);
    }
}
