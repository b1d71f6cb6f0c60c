use super::{
    non_empty, parse_f64_loose, BatteryInfo, BatteryTime, Connection, FirmwareInfo, GpuInfo,
    LocalAccount, NetInterface, SecurityStatus, SoftwareItem,
};
use crate::error::CollectError;
use crate::executor::CommandExecutor;
use crate::runner::CommandLine;
use serde_json::Value;

fn profiler_items<'a>(json: &'a Value, data_type: &str) -> Result<&'a Vec<Value>, CollectError> {
    json.get(data_type)
        .and_then(Value::as_array)
        .ok_or_else(|| CollectError::malformed(format!("system_profiler: missing {data_type}")))
}

fn str_field(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).and_then(non_empty)
}

async fn system_profiler(exec: &CommandExecutor, data_type: &str) -> Result<Value, CollectError> {
    let text = exec
        .run(&CommandLine::new("system_profiler").args([data_type, "-json"]))
        .await?;
    serde_json::from_str(&text)
        .map_err(|err| CollectError::malformed(format!("system_profiler {data_type}: {err}")))
}

pub fn parse_hardware_json(json: &Value) -> Result<FirmwareInfo, CollectError> {
    let item = profiler_items(json, "SPHardwareDataType")?
        .first()
        .ok_or_else(|| CollectError::malformed("SPHardwareDataType is empty"))?;
    Ok(FirmwareInfo {
        bios_vendor: Some("Apple Inc.".to_string()),
        bios_version: str_field(item, "boot_rom_version"),
        bios_date: None,
        board_vendor: Some("Apple Inc.".to_string()),
        board_model: str_field(item, "machine_model"),
        system_vendor: Some("Apple Inc.".to_string()),
        system_product: str_field(item, "machine_name").or_else(|| str_field(item, "model_name")),
        uuid: str_field(item, "platform_UUID"),
        serial: str_field(item, "serial_number"),
    })
}

pub async fn firmware(exec: &CommandExecutor) -> Result<FirmwareInfo, CollectError> {
    parse_hardware_json(&system_profiler(exec, "SPHardwareDataType").await?)
}

/// Sizes like `"8 GB"` or `"1536 MB"`.
fn parse_vram(text: &str) -> Option<u64> {
    let value = parse_f64_loose(text)?;
    let mult = if text.contains("GB") {
        1024.0 * 1024.0 * 1024.0
    } else if text.contains("MB") {
        1024.0 * 1024.0
    } else {
        1.0
    };
    Some((value * mult) as u64)
}

pub fn parse_displays_json(json: &Value) -> Result<Vec<GpuInfo>, CollectError> {
    Ok(profiler_items(json, "SPDisplaysDataType")?
        .iter()
        .filter_map(|item| {
            let name = str_field(item, "sppci_model")?;
            let vram = str_field(item, "spdisplays_vram")
                .or_else(|| str_field(item, "spdisplays_vram_shared"));
            Some(GpuInfo {
                name,
                adapter_ram_bytes: vram.as_deref().and_then(parse_vram),
                driver_version: str_field(item, "spdisplays_mtlgpufamilysupport"),
                processor: str_field(item, "sppci_cores").map(|c| format!("{c} cores")),
            })
        })
        .collect())
}

pub async fn gpus(exec: &CommandExecutor) -> Result<Vec<GpuInfo>, CollectError> {
    parse_displays_json(&system_profiler(exec, "SPDisplaysDataType").await?)
}

pub fn parse_applications_json(json: &Value) -> Result<Vec<SoftwareItem>, CollectError> {
    Ok(profiler_items(json, "SPApplicationsDataType")?
        .iter()
        .filter_map(|item| {
            Some(SoftwareItem {
                name: str_field(item, "_name")?,
                version: str_field(item, "version").unwrap_or_default(),
                publisher: str_field(item, "obtained_from").unwrap_or_default(),
                install_date: str_field(item, "lastModified").unwrap_or_default(),
            })
        })
        .collect())
}

pub async fn installed_software(exec: &CommandExecutor) -> Result<Vec<SoftwareItem>, CollectError> {
    parse_applications_json(&system_profiler(exec, "SPApplicationsDataType").await?)
}

/// Parses `ifconfig` blocks.
pub fn parse_ifconfig(text: &str) -> Vec<NetInterface> {
    let mut out: Vec<NetInterface> = Vec::new();
    let mut inactive = false;
    for line in text.lines() {
        if !line.starts_with(char::is_whitespace) {
            if let Some(last) = out.last_mut() {
                last.up &= !inactive;
            }
            inactive = false;
            let Some((name, rest)) = line.split_once(':') else {
                continue;
            };
            let flags = rest
                .split_once('<')
                .and_then(|(_, r)| r.split_once('>'))
                .map(|(f, _)| f)
                .unwrap_or_default();
            let mtu = rest
                .split_once("mtu ")
                .and_then(|(_, m)| m.split_whitespace().next())
                .and_then(|m| m.parse().ok());
            out.push(NetInterface {
                name: name.to_string(),
                up: flags.split(',').any(|f| f == "UP"),
                mtu,
                ..NetInterface::default()
            });
            continue;
        }

        let Some(iface) = out.last_mut() else {
            continue;
        };
        let f: Vec<&str> = line.split_whitespace().collect();
        match f.as_slice() {
            ["ether", mac, ..] => iface.mac = mac.to_string(),
            ["inet", addr, ..] => iface.ipv4.push(addr.to_string()),
            ["inet6", addr, ..] => {
                iface.ipv6.push(addr.split('%').next().unwrap_or_default().to_string())
            }
            ["status:", state, ..] => inactive = *state != "active",
            _ => {}
        }
    }
    if let Some(last) = out.last_mut() {
        last.up &= !inactive;
    }
    out
}

pub async fn net_ifaces(exec: &CommandExecutor) -> Result<Vec<NetInterface>, CollectError> {
    Ok(parse_ifconfig(&exec.run(&CommandLine::new("ifconfig")).await?))
}

/// Parses `lsof -nP -iTCP` rows.
pub fn parse_lsof(text: &str) -> Vec<Connection> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let f: Vec<&str> = line.split_whitespace().collect();
            if f.len() < 10 {
                return None;
            }
            let name = f[8];
            let (local, remote) = match name.split_once("->") {
                Some((l, r)) => (l.to_string(), r.to_string()),
                None => (name.to_string(), String::new()),
            };
            Some(Connection {
                proto: f[7].to_string(),
                local,
                remote,
                status: f[9].trim_matches(|c| c == '(' || c == ')').to_string(),
                pid: f[1].parse().ok(),
            })
        })
        .collect()
}

pub async fn net_connections(exec: &CommandExecutor) -> Result<Vec<Connection>, CollectError> {
    let text = exec
        .run(&CommandLine::new("lsof").args(["-nP", "-iTCP"]))
        .await?;
    Ok(parse_lsof(&text))
}

/// Parses `pmset -g batt`.
pub fn parse_pmset_batt(text: &str) -> Result<BatteryInfo, CollectError> {
    let on_ac = text.contains("'AC Power'");
    let line = text
        .lines()
        .find(|l| l.contains("InternalBattery"))
        .ok_or_else(|| CollectError::unsupported("no internal battery"))?;
    let percent = line
        .split('\t')
        .nth(1)
        .and_then(|rest| rest.split('%').next())
        .and_then(parse_f64_loose)
        .ok_or_else(|| CollectError::malformed(format!("pmset line '{line}'")))?;

    let time_left = if on_ac {
        BatteryTime::Unlimited
    } else {
        line.split(';')
            .map(str::trim)
            .find_map(|part| part.strip_suffix(" remaining present: true").or(part.strip_suffix(" remaining")))
            .and_then(|hm| hm.split_once(':'))
            .and_then(|(h, m)| Some(h.trim().parse::<u64>().ok()? * 3600 + m.trim().parse::<u64>().ok()? * 60))
            .map(BatteryTime::Seconds)
            .unwrap_or(BatteryTime::Unknown)
    };
    Ok(BatteryInfo {
        percent,
        plugged: on_ac,
        time_left,
    })
}

pub async fn battery(exec: &CommandExecutor) -> Result<BatteryInfo, CollectError> {
    parse_pmset_batt(
        &exec
            .run(&CommandLine::new("pmset").args(["-g", "batt"]))
            .await?,
    )
}

/// Parses `dscl . list /Users UniqueID` with the admin group membership line.
pub fn parse_dscl_users(users: &str, admin_membership: &str) -> Vec<LocalAccount> {
    let admins: Vec<&str> = admin_membership
        .split_once(':')
        .map(|(_, m)| m.split_whitespace().collect())
        .unwrap_or_default();
    users
        .lines()
        .filter_map(|line| {
            let mut f = line.split_whitespace();
            let name = f.next()?;
            let uid: i64 = f.next()?.parse().ok()?;
            if name.starts_with('_') || (uid != 0 && uid < 500) {
                return None;
            }
            Some(LocalAccount {
                name: name.to_string(),
                full_name: String::new(),
                uid: uid.to_string(),
                home: format!("/Users/{name}"),
                shell: String::new(),
                enabled: true,
                is_admin: admins.contains(&name),
            })
        })
        .collect()
}

pub async fn local_accounts(exec: &CommandExecutor) -> Result<Vec<LocalAccount>, CollectError> {
    let users = exec
        .run(&CommandLine::new("dscl").args([".", "list", "/Users", "UniqueID"]))
        .await?;
    let admins = exec
        .run(&CommandLine::new("dscl").args([".", "-read", "/Groups/admin", "GroupMembership"]))
        .await
        .unwrap_or_default();
    Ok(parse_dscl_users(&users, &admins))
}

async fn first_line_of(exec: &CommandExecutor, cmd: CommandLine) -> Option<String> {
    let text = exec.run(&cmd).await.ok()?;
    text.lines().next().and_then(non_empty)
}

pub fn describe_socketfilterfw(text: &str) -> String {
    if text.contains("enabled") {
        "On".to_string()
    } else if text.contains("disabled") {
        "Off".to_string()
    } else {
        "Unknown".to_string()
    }
}

pub async fn security_status(exec: &CommandExecutor) -> Result<SecurityStatus, CollectError> {
    let firewall = first_line_of(
        exec,
        CommandLine::new("/usr/libexec/ApplicationFirewall/socketfilterfw").arg("--getglobalstate"),
    )
    .await
    .map(|s| describe_socketfilterfw(&s))
    .unwrap_or_else(|| "Unknown".to_string());

    let mut extra = Vec::new();
    for (label, cmd) in [
        ("System Integrity Protection", CommandLine::new("csrutil").arg("status")),
        ("Gatekeeper", CommandLine::new("spctl").arg("--status")),
        ("FileVault", CommandLine::new("fdesetup").arg("status")),
    ] {
        if let Some(line) = first_line_of(exec, cmd).await {
            extra.push((label.to_string(), line));
        }
    }

    Ok(SecurityStatus {
        antivirus: "XProtect (built-in)".to_string(),
        firewall,
        uac: "N/A".to_string(),
        is_admin: super::linux::is_elevated(),
        extra,
    })
}

pub fn parse_pmset_lowpower(text: &str) -> String {
    let low = text.lines().any(|l| {
        let f: Vec<&str> = l.split_whitespace().collect();
        matches!(f.as_slice(), ["lowpowermode", "1", ..])
    });
    if low {
        "Low Power Mode".to_string()
    } else {
        "Normal".to_string()
    }
}

pub async fn power_plan(exec: &CommandExecutor) -> Result<String, CollectError> {
    Ok(parse_pmset_lowpower(
        &exec.run(&CommandLine::new("pmset").arg("-g")).await?,
    ))
}

pub async fn max_cpu_mhz(exec: &CommandExecutor) -> Option<u64> {
    let hz = exec
        .run(&CommandLine::new("sysctl").args(["-n", "hw.cpufrequency_max"]))
        .await
        .ok()?;
    hz.trim().parse::<u64>().ok().map(|hz| hz / 1_000_000)
}
