use device_client::{ClientCall, ClientError, DeviceClient, MemoryDeviceClient};
use types::{DataPointKey, WriteValue};

#[tokio::test]
async fn memory_client_records_calls_in_order() {
    let client = MemoryDeviceClient::new().with_value("7101", 1);
    let key = DataPointKey::from_static("47015");

    let reading = client.read_all(&[DataPointKey::from_static("7101")]).await.expect("read");
    assert_eq!(reading.get("7101"), Some(&serde_json::json!(1)));

    client
        .write_one(&key, &WriteValue::Multi(vec![1, 500, 90]))
        .await
        .expect("write");

    assert_eq!(
        client.calls(),
        vec![
            ClientCall::ReadAll,
            ClientCall::WriteOne(key, WriteValue::Multi(vec![1, 500, 90])),
        ]
    );
    assert_eq!(client.read_count(), 1);
}

#[tokio::test]
async fn mirrored_write_shows_up_on_read_key() {
    let client = MemoryDeviceClient::new()
        .with_value("7101", 1)
        .with_mirror("47005", "7101");

    client
        .write_one(&DataPointKey::from_static("47005"), &WriteValue::Single(4))
        .await
        .expect("write");

    assert_eq!(client.value("7101"), Some(serde_json::json!(4)));
}

#[tokio::test]
async fn scripted_failures_surface_as_client_errors() {
    let client = MemoryDeviceClient::new();
    client.fail_reads(true);
    assert!(matches!(client.read_all(&[]).await, Err(ClientError::Io(_))));

    client.reject_writes(true);
    let err = client
        .write_one(&DataPointKey::from_static("1142"), &WriteValue::Single(20))
        .await
        .expect_err("rejected");
    assert!(err.is_rejection());
}
