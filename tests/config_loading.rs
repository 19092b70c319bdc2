use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use shared_camera::{CameraConfig, ChannelKind, DeviceKind, Role, StoreKind};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SHARED_CAMERA_CONFIG",
        "SHARED_CAMERA_INDEX",
        "SHARED_CAMERA_NAME",
        "SHARED_CAMERA_HOST",
        "SHARED_CAMERA_PORT",
        "SHARED_CAMERA_TIMEOUT_MS",
        "SHARED_CAMERA_AUTOTAKEOVER",
        "SHARED_CAMERA_CHANNEL",
        "SHARED_CAMERA_STORE",
        "SHARED_CAMERA_SQLITE_PATH",
        "SHARED_CAMERA_DEVICE",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(body.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "camera_index": 2,
            "autotakeover": true,
            "name": "front_door",
            "timeout_ms": 250,
            "takeover_interval_ms": 5000,
            "channel": {
                "kind": "streaming",
                "host": "10.0.0.7",
                "bind_host": "127.0.0.1",
                "max_message_bytes": 1048576
            },
            "device": {
                "kind": "synthetic",
                "width": 320,
                "height": 240
            }
        }"#,
    );

    std::env::set_var("SHARED_CAMERA_CONFIG", file.path());
    std::env::set_var("SHARED_CAMERA_NAME", "  back_door ");
    std::env::set_var("SHARED_CAMERA_PORT", "6000");
    std::env::set_var("SHARED_CAMERA_AUTOTAKEOVER", "off");

    let cfg = CameraConfig::load().expect("load config");

    assert_eq!(cfg.camera.camera_index, 2);
    assert_eq!(cfg.camera.name, "back_door");
    assert!(!cfg.camera.autotakeover);
    assert_eq!(cfg.camera.timeout, Duration::from_millis(250));
    assert_eq!(cfg.camera.takeover_interval, Duration::from_secs(5));
    assert_eq!(cfg.channel.kind, ChannelKind::Streaming);
    assert_eq!(cfg.channel.host, "10.0.0.7");
    assert_eq!(cfg.channel.bind_host, "127.0.0.1");
    assert_eq!(cfg.channel.max_message_bytes, 1_048_576);
    assert_eq!(cfg.channel.port(), 6000);
    assert_eq!(cfg.device.kind, DeviceKind::Synthetic);
    assert_eq!((cfg.device.width, cfg.device.height), (320, 240));

    clear_env();
}

#[test]
fn loads_toml_config_with_kind_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
            name = "garage"

            [channel]
            kind = "slot"
            store = "sqlite"
            sqlite_path = "/var/lib/shared_camera/slots.db"
        "#,
    );

    let cfg = CameraConfig::load_from(Some(file.path())).expect("load config");

    assert_eq!(cfg.camera.name, "garage");
    assert!(cfg.camera.autotakeover);
    assert_eq!(cfg.camera.timeout, Duration::from_secs(1));
    assert_eq!(cfg.channel.kind, ChannelKind::Slot);
    assert_eq!(cfg.channel.store, StoreKind::Sqlite);
    assert_eq!(cfg.channel.port(), 6379);
    assert_eq!(
        cfg.channel.sqlite_path,
        Path::new("/var/lib/shared_camera/slots.db")
    );

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SHARED_CAMERA_TIMEOUT_MS", "0");
    assert!(CameraConfig::load().is_err());
    clear_env();

    std::env::set_var("SHARED_CAMERA_CHANNEL", "carrier-pigeon");
    assert!(CameraConfig::load().is_err());
    clear_env();

    std::env::set_var("SHARED_CAMERA_INDEX", "-1");
    assert!(CameraConfig::load().is_err());
    clear_env();

    let file = write_config(".json", r#"{ "name": "   " }"#);
    assert!(CameraConfig::load_from(Some(file.path())).is_err());

    let file = write_config(".json", "{ not json");
    assert!(CameraConfig::load_from(Some(file.path())).is_err());

    clear_env();
}

#[test]
fn builds_sqlite_backed_camera_from_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("slots.db");
    let file = write_config(
        ".toml",
        &format!(
            r#"
                name = "porch"
                timeout_ms = 200

                [channel]
                store = "sqlite"
                sqlite_path = "{}"

                [device]
                width = 32
                height = 24
                claim_port_base = 48200
            "#,
            db_path.display()
        ),
    );

    let cfg = CameraConfig::load_from(Some(file.path())).expect("load config");
    let mut owner = cfg.build().expect("build owner");
    let mut follower = cfg.build().expect("build follower");
    assert_eq!(owner.role(), Role::Owner);
    assert_eq!(follower.role(), Role::Follower);

    let sent = owner.read();
    assert_eq!(sent.shape(), (24, 32, 3));
    assert_eq!(follower.read(), sent);

    owner.stop();
    follower.stop();
    clear_env();
}
