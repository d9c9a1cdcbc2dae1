use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "12111".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("mock stripe api listening on http://{addr}/v1/ (secret key {})", mock_server::SECRET_KEY);
    mock_server::run(listener).await
}
