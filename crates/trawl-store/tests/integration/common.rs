use redis::aio::ConnectionManager;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};

/// Spins up a Redis container and returns its URL plus a connection manager.
///
/// The `ContainerAsync` must stay in scope for the test duration.
pub async fn setup_test_redis() -> (String, ConnectionManager, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(ContainerPort::Tcp(6379))
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .start()
        .await
        .expect("Failed to start Redis container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get port");
    let url = format!("redis://{host}:{port}");

    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let conn = loop {
        let client = redis::Client::open(url.as_str()).expect("Invalid Redis URL");
        match ConnectionManager::new(client).await {
            Ok(conn) => break conn,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to Redis after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    (url, conn, container)
}
