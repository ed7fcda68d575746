//! Exercises reconciliation, backoff, and reinitialization bookkeeping
//! against the in-memory `DeviceMap`, without any real SNMP or Zabbix
//! traffic — the parts of the device lifecycle that don't require a
//! live network peer.

use loopd::inventory::{self, ZbxHost};
use loopd::model::{AlarmKind, Device, DeviceMap, HostState, Interface, MAX_BACKOFF};

#[test]
fn new_device_starts_in_init_and_gets_enabled_after_reinit() {
    let mut devices = DeviceMap::new();
    let datadir = tempfile::tempdir().unwrap();

    let hosts = vec![ZbxHost { host: "10.1.1.1".into(), name: "core1".into(), community: None }];
    let stats = inventory::reconcile(&mut devices, hosts, "public", datadir.path()).unwrap();
    assert_eq!(stats.added, 1);

    let dev = devices.get_mut("10.1.1.1").unwrap();
    assert_eq!(dev.state, HostState::Init);

    // Simulate what the Worker's reinit path does once discovery succeeds.
    dev.objid = "1.3.6.1.4.1.9.1.1".into();
    dev.state = HostState::Enabled;
    dev.interfaces.insert(1, Interface::new(1, "Gi0/1".into(), "uplink".into(), dev.datadir.join("1.rrd")));
    dev.prepare_request();

    assert_eq!(dev.state, HostState::Enabled);
    assert_eq!(dev.request.len(), 3); // sysObjectID, sysUpTime, one interface
}

#[test]
fn backoff_doubles_and_saturates_at_max() {
    let mut dev = Device::new("10.1.1.2", "sw2", "public", std::path::PathBuf::new());
    assert_eq!(dev.backoff, 1);

    let mut iterations = 0;
    while dev.backoff < MAX_BACKOFF {
        dev.bump_backoff();
        iterations += 1;
        assert!(iterations < 1000, "backoff never saturated");
    }

    assert_eq!(dev.backoff, MAX_BACKOFF);
    dev.bump_backoff();
    assert_eq!(dev.backoff, MAX_BACKOFF, "backoff must not exceed the cap");
}

#[test]
fn reinit_resets_poll_state_but_keeps_interface_records() {
    let mut dev = Device::new("10.1.1.3", "sw3", "public", std::path::PathBuf::new());
    let mut intf = Interface::new(1, "eth0".into(), "uplink".into(), std::path::PathBuf::new());
    intf.poll.counter = 123_456;
    intf.poll.alarm = AlarmKind::Mavmax;
    dev.interfaces.insert(1, intf);
    dev.timeticks = 999;
    dev.backoff = 16;

    dev.reset();

    assert_eq!(dev.timeticks, 0);
    assert_eq!(dev.backoff, 1);
    let intf = &dev.interfaces[&1];
    assert_eq!(intf.poll.counter, 0);
    assert_eq!(intf.poll.alarm, AlarmKind::None);
    assert_eq!(intf.name, "eth0", "reinit must not discard interface identity");
}

#[test]
fn reconciliation_marks_then_sweeps_a_decommissioned_device() {
    let mut devices = DeviceMap::new();
    let datadir = tempfile::tempdir().unwrap();

    let hosts = vec![ZbxHost { host: "10.1.1.4".into(), name: "sw4".into(), community: None }];
    inventory::reconcile(&mut devices, hosts, "public", datadir.path()).unwrap();
    assert!(!devices["10.1.1.4"].delete_mark);

    // Next cycle no longer reports the host: it picks up a delete mark...
    let stats = inventory::reconcile(&mut devices, vec![], "public", datadir.path()).unwrap();
    assert_eq!(stats.marked_for_deletion, 1);
    assert!(devices["10.1.1.4"].delete_mark);

    // ...which the Main Controller sweeps on the next reconciliation fold.
    let to_delete: Vec<String> = devices.iter().filter(|(_, d)| d.delete_mark).map(|(h, _)| h.clone()).collect();
    for host in to_delete {
        devices.remove(&host);
    }
    assert!(devices.is_empty());
}
