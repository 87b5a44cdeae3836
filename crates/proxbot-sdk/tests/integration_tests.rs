//! Integration tests for the Proxmox client against a mock API server.
//!
//! Covers the calls the dispatcher relies on:
//! - inventory, status and config reads
//! - power actions, config updates per machine kind, clone, delete
//! - snapshot create/list/rollback, rrd data
//! - error body translation

use std::time::Duration;

use mockito::{Matcher, Server};
use proxbot_common::{
    CloneRequest, Hypervisor, MachineKind, MachineRef, PowerAction, PowerState, ProxbotError,
    Timeframe,
};
use proxbot_sdk::{ApiToken, HypervisorClient};
use serde_json::json;

const AUTH: &str = "PVEAPIToken=root@pam!proxbot=s3cret";

fn client_for(server: &Server) -> HypervisorClient {
    HypervisorClient::with_base_url(
        server.url(),
        ApiToken::new("root@pam", "proxbot", "s3cret"),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn vm(id: u32) -> MachineRef {
    MachineRef {
        id,
        node: "pve1".to_string(),
        kind: MachineKind::Vm,
    }
}

fn container(id: u32) -> MachineRef {
    MachineRef {
        id,
        node: "pve2".to_string(),
        kind: MachineKind::Container,
    }
}

#[test]
fn test_cluster_resources() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/api2/json/cluster/resources")
        .match_query(Matcher::UrlEncoded("type".into(), "vm".into()))
        .match_header("authorization", AUTH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"data": [
                {"vmid": 101, "node": "pve1", "type": "qemu", "name": "web", "status": "running"},
                {"vmid": "200", "node": "pve2", "type": "lxc", "name": "dns", "status": "stopped"}
            ]})
            .to_string(),
        )
        .create();

    let resources = client_for(&server).cluster_resources().unwrap();

    assert_eq!(resources.len(), 2);
    assert_eq!(resources[0].vmid, 101);
    assert_eq!(resources[1].vmid, 200);
    assert_eq!(resources[1].kind, MachineKind::Container);
    mock.assert();
}

#[test]
fn test_machine_status_and_config() {
    let mut server = Server::new();
    let status_mock = server
        .mock("GET", "/api2/json/nodes/pve1/qemu/101/status/current")
        .with_status(200)
        .with_body(
            json!({"data": {
                "name": "web", "status": "running", "cpu": 0.125,
                "mem": 1073741824u64, "maxmem": 2147483648u64, "uptime": 3661
            }})
            .to_string(),
        )
        .create();
    let config_mock = server
        .mock("GET", "/api2/json/nodes/pve1/qemu/101/config")
        .with_status(200)
        .with_body(json!({"data": {"cores": 2, "memory": "2048", "net0": "virtio,bridge=vmbr0"}}).to_string())
        .create();

    let client = client_for(&server);
    let status = client.machine_status(&vm(101)).unwrap();
    let config = client.machine_config(&vm(101)).unwrap();

    assert_eq!(status.power_state, PowerState::Running);
    assert_eq!(status.uptime, 3661);
    assert_eq!(config.cores, Some(2));
    assert_eq!(config.memory_mb, Some(2048));
    status_mock.assert();
    config_mock.assert();
}

#[test]
fn test_power_actions_post_to_kind_path() {
    let mut server = Server::new();
    let start = server
        .mock("POST", "/api2/json/nodes/pve2/lxc/200/status/start")
        .match_header("authorization", AUTH)
        .with_status(200)
        .with_body(r#"{"data":"UPID:pve2:0001:start"}"#)
        .create();
    let shutdown = server
        .mock("POST", "/api2/json/nodes/pve1/qemu/101/status/shutdown")
        .with_status(200)
        .with_body(r#"{"data":"UPID:pve1:0002:shutdown"}"#)
        .create();

    let client = client_for(&server);
    client.power(&container(200), PowerAction::Start).unwrap();
    client.power(&vm(101), PowerAction::Shutdown).unwrap();

    start.assert();
    shutdown.assert();
}

#[test]
fn test_update_config_uses_post_for_vm_and_put_for_container() {
    let mut server = Server::new();
    let body = Matcher::AllOf(vec![
        Matcher::UrlEncoded("cores".into(), "4".into()),
        Matcher::UrlEncoded("memory".into(), "4096".into()),
    ]);
    let vm_mock = server
        .mock("POST", "/api2/json/nodes/pve1/qemu/101/config")
        .match_body(body.clone())
        .with_status(200)
        .with_body(r#"{"data":null}"#)
        .create();
    let ct_mock = server
        .mock("PUT", "/api2/json/nodes/pve2/lxc/200/config")
        .match_body(body)
        .with_status(200)
        .with_body(r#"{"data":null}"#)
        .create();

    let client = client_for(&server);
    client.update_config(&vm(101), 4, 4096).unwrap();
    client.update_config(&container(200), 4, 4096).unwrap();

    vm_mock.assert();
    ct_mock.assert();
}

#[test]
fn test_clone_full_with_target() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/api2/json/nodes/pve1/qemu/9000/clone")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("newid".into(), "120".into()),
            Matcher::UrlEncoded("name".into(), "build-01".into()),
            Matcher::UrlEncoded("full".into(), "1".into()),
            Matcher::UrlEncoded("target".into(), "pve3".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"data":"UPID:pve1:0003:qmclone"}"#)
        .create();

    client_for(&server)
        .clone_machine(
            &vm(9000),
            &CloneRequest {
                new_id: 120,
                name: "build-01".to_string(),
                full: true,
                target_node: Some("pve3".to_string()),
            },
        )
        .unwrap();

    mock.assert();
}

#[test]
fn test_clone_container_uses_hostname() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/api2/json/nodes/pve2/lxc/8000/clone")
        .match_body(Matcher::UrlEncoded("hostname".into(), "ct-01".into()))
        .with_status(200)
        .with_body(r#"{"data":"UPID"}"#)
        .create();

    client_for(&server)
        .clone_machine(
            &container(8000),
            &CloneRequest {
                new_id: 121,
                name: "ct-01".to_string(),
                full: true,
                target_node: None,
            },
        )
        .unwrap();

    mock.assert();
}

#[test]
fn test_snapshots() {
    let mut server = Server::new();
    let create = server
        .mock("POST", "/api2/json/nodes/pve1/qemu/101/snapshot")
        .match_body(Matcher::UrlEncoded("snapname".into(), "before_upgrade".into()))
        .with_status(200)
        .with_body(r#"{"data":"UPID"}"#)
        .create();
    let list = server
        .mock("GET", "/api2/json/nodes/pve1/qemu/101/snapshot")
        .with_status(200)
        .with_body(
            json!({"data": [
                {"name": "before_upgrade", "snaptime": 1700000000, "description": ""},
                {"name": "current", "description": "You are here!"}
            ]})
            .to_string(),
        )
        .create();
    let rollback = server
        .mock("POST", "/api2/json/nodes/pve1/qemu/101/snapshot/before_upgrade/rollback")
        .with_status(200)
        .with_body(r#"{"data":"UPID"}"#)
        .create();

    let client = client_for(&server);
    client.create_snapshot(&vm(101), "before_upgrade").unwrap();
    let snapshots = client.list_snapshots(&vm(101)).unwrap();
    client.rollback_snapshot(&vm(101), "before_upgrade").unwrap();

    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].snaptime, Some(1_700_000_000));
    assert_eq!(snapshots[1].snaptime, None);
    create.assert();
    list.assert();
    rollback.assert();
}

#[test]
fn test_rollback_encodes_snapshot_name() {
    let mut server = Server::new();
    let rollback = server
        .mock("POST", "/api2/json/nodes/pve1/qemu/101/snapshot/pre%20upgrade%2Fv2/rollback")
        .match_header("authorization", AUTH)
        .with_status(200)
        .with_body(r#"{"data":"UPID"}"#)
        .create();

    client_for(&server)
        .rollback_snapshot(&vm(101), "pre upgrade/v2")
        .unwrap();

    rollback.assert();
}

#[test]
fn test_delete_and_rrd_data() {
    let mut server = Server::new();
    let delete = server
        .mock("DELETE", "/api2/json/nodes/pve1/qemu/105")
        .with_status(200)
        .with_body(r#"{"data":"UPID"}"#)
        .create();
    let rrd = server
        .mock("GET", "/api2/json/nodes/pve1/qemu/105/rrddata")
        .match_query(Matcher::UrlEncoded("timeframe".into(), "week".into()))
        .with_status(200)
        .with_body(
            json!({"data": [
                {"time": 1700000000, "cpu": 0.5, "mem": 1024.0, "netin": 10.0, "netout": 20.0},
                {"time": 1700000060}
            ]})
            .to_string(),
        )
        .create();

    let client = client_for(&server);
    client.delete_machine(&vm(105)).unwrap();
    let samples = client.rrd_data(&vm(105), Timeframe::Week).unwrap();

    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].cpu, Some(0.5));
    assert_eq!(samples[1].cpu, None);
    delete.assert();
    rrd.assert();
}

#[test]
fn test_api_error_translation() {
    let mut server = Server::new();
    let _mock = server
        .mock("POST", "/api2/json/nodes/pve1/qemu/101/config")
        .with_status(400)
        .with_body(r#"{"data":null,"errors":{"memory":"value must have a minimum value of 16"}}"#)
        .create();

    let err = client_for(&server)
        .update_config(&vm(101), 2, 1)
        .unwrap_err();

    match err {
        ProxbotError::Api { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("memory"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_unauthorized_falls_back_to_reason() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/api2/json/cluster/resources")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body("")
        .create();

    let err = client_for(&server).cluster_resources().unwrap_err();
    assert_eq!(err.to_string(), "API error (401): Unauthorized");
}
