//! Command builders for tunnel, FDB and bridge operations

use std::net::IpAddr;

use vxlanmgr_common::shell::{ShellCommand, BRIDGE_CMD, IP_CMD, NMCLI_CMD};

use crate::types::{VXLAN_DST_PORT, VXLAN_KIND, WILDCARD_MAC};

/// Build connection listing command
///
/// Terse output, one `NAME:UUID:TYPE:DEVICE` line per connection
pub fn build_list_connections_cmd() -> ShellCommand {
    ShellCommand::new(NMCLI_CMD).args([
        "-t",
        "-f",
        "NAME,UUID,TYPE,DEVICE",
        "connection",
        "show",
    ])
}

/// Build connection detail command
///
/// Terse output, one `setting.property:value` line per property
pub fn build_show_connection_cmd(connection: &str) -> ShellCommand {
    ShellCommand::privileged(NMCLI_CMD).args(["-t", "connection", "show", connection])
}

/// Build VXLAN connection creation command
pub fn build_add_connection_cmd(
    connection: &str,
    ifname: &str,
    vni: u32,
    remote: IpAddr,
    ipv4_method: &str,
    ipv6_method: &str,
) -> ShellCommand {
    ShellCommand::privileged(NMCLI_CMD)
        .args(["connection", "add", "type", VXLAN_KIND])
        .args(["con-name", connection, "ifname", ifname])
        .args(["id".to_string(), vni.to_string()])
        .args(["remote".to_string(), remote.to_string()])
        .args(["destination-port".to_string(), VXLAN_DST_PORT.to_string()])
        .args(["ipv4.method", ipv4_method, "ipv6.method", ipv6_method])
}

/// Build VXLAN connection modification command
pub fn build_modify_connection_cmd(connection: &str, vni: u32, remote: IpAddr) -> ShellCommand {
    ShellCommand::privileged(NMCLI_CMD)
        .args(["connection", "modify", connection])
        .args(["vxlan.id".to_string(), vni.to_string()])
        .args(["vxlan.remote".to_string(), remote.to_string()])
}

/// Build connection deletion command
pub fn build_delete_connection_cmd(connection: &str) -> ShellCommand {
    ShellCommand::privileged(NMCLI_CMD).args(["connection", "delete", connection])
}

/// Build FDB dump command, optionally scoped to one device
pub fn build_fdb_show_cmd(interface: Option<&str>) -> ShellCommand {
    let cmd = ShellCommand::privileged(BRIDGE_CMD).args(["fdb", "show"]);
    match interface {
        Some(dev) => cmd.args(["dev", dev]),
        None => cmd,
    }
}

/// Build FDB flooding entry append command
pub fn build_fdb_append_cmd(remote: IpAddr, interface: &str) -> ShellCommand {
    ShellCommand::privileged(BRIDGE_CMD)
        .args(["fdb", "append", "to", WILDCARD_MAC])
        .args(["dst".to_string(), remote.to_string()])
        .args(["dev", interface])
}

/// Build FDB flooding entry deletion command
pub fn build_fdb_del_cmd(remote: IpAddr, interface: &str) -> ShellCommand {
    ShellCommand::privileged(BRIDGE_CMD)
        .args(["fdb", "del", "to", WILDCARD_MAC])
        .args(["dst".to_string(), remote.to_string()])
        .args(["dev", interface])
}

/// Build interface bring-up command
pub fn build_set_link_up_cmd(ifname: &str) -> ShellCommand {
    ShellCommand::privileged(IP_CMD).args(["link", "set", "dev", ifname, "up"])
}

/// Build bridge membership command
pub fn build_set_master_cmd(ifname: &str, bridge: &str) -> ShellCommand {
    ShellCommand::privileged(IP_CMD).args(["link", "set", "dev", ifname, "master", bridge])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_build_list_connections_cmd() {
        let cmd = build_list_connections_cmd();
        assert!(!cmd.is_privileged());
        assert_eq!(
            cmd.to_string(),
            "/usr/bin/nmcli -t -f NAME,UUID,TYPE,DEVICE connection show"
        );
    }

    #[test]
    fn test_build_show_connection_cmd() {
        let cmd = build_show_connection_cmd("0b6c6a1e-uuid");
        assert!(cmd.is_privileged());
        assert!(cmd.to_string().ends_with("-t connection show 0b6c6a1e-uuid"));
    }

    #[test]
    fn test_build_add_connection_cmd() {
        let cmd = build_add_connection_cmd(
            "vxlan-vxlan100",
            "vxlan100",
            100,
            ip("10.0.0.2"),
            "link-local",
            "disabled",
        );
        assert!(cmd.is_privileged());
        assert_eq!(
            cmd.argv(),
            [
                "connection",
                "add",
                "type",
                "vxlan",
                "con-name",
                "vxlan-vxlan100",
                "ifname",
                "vxlan100",
                "id",
                "100",
                "remote",
                "10.0.0.2",
                "destination-port",
                "4789",
                "ipv4.method",
                "link-local",
                "ipv6.method",
                "disabled",
            ]
        );
    }

    #[test]
    fn test_build_modify_connection_cmd() {
        let cmd = build_modify_connection_cmd("vxlan-vxlan100", 100, ip("10.0.0.9"));
        assert!(cmd
            .to_string()
            .contains("connection modify vxlan-vxlan100 vxlan.id 100 vxlan.remote 10.0.0.9"));
    }

    #[test]
    fn test_build_delete_connection_cmd() {
        let cmd = build_delete_connection_cmd("vxlan-vxlan100");
        assert!(cmd.to_string().contains("connection delete vxlan-vxlan100"));
    }

    #[test]
    fn test_build_fdb_show_cmd() {
        assert_eq!(build_fdb_show_cmd(None).argv(), ["fdb", "show"]);
        assert_eq!(
            build_fdb_show_cmd(Some("vxlan100")).argv(),
            ["fdb", "show", "dev", "vxlan100"]
        );
    }

    #[test]
    fn test_build_fdb_append_cmd() {
        let cmd = build_fdb_append_cmd(ip("10.0.0.5"), "vxlan100");
        assert_eq!(
            cmd.to_string(),
            "/sbin/bridge fdb append to 00:00:00:00:00:00 dst 10.0.0.5 dev vxlan100"
        );
    }

    #[test]
    fn test_build_fdb_del_cmd() {
        let cmd = build_fdb_del_cmd(ip("fd00::5"), "vxlan100");
        assert_eq!(
            cmd.to_string(),
            "/sbin/bridge fdb del to 00:00:00:00:00:00 dst fd00::5 dev vxlan100"
        );
    }

    #[test]
    fn test_build_link_cmds() {
        assert_eq!(
            build_set_link_up_cmd("br-vxlan").to_string(),
            "/sbin/ip link set dev br-vxlan up"
        );
        assert_eq!(
            build_set_master_cmd("vxlan100", "br-vxlan").to_string(),
            "/sbin/ip link set dev vxlan100 master br-vxlan"
        );
    }

    #[test]
    fn test_hostile_names_stay_single_arguments() {
        let cmd = build_delete_connection_cmd("x; rm -rf /");
        assert_eq!(cmd.argv().last().map(String::as_str), Some("x; rm -rf /"));
    }
}
