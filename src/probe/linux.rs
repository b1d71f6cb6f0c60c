//! Linux lookups: procfs, sysfs, `/etc` files and a few common tools. The
//! `who`, `last` and timezone helpers are shared with macOS.

use super::{
    non_empty, parse_u64_loose, BatteryInfo, BatteryTime, Connection, DiskIo, FirmwareInfo,
    GpuInfo, LocalAccount, LoggedInUser, LoginRecord, NetInterface, SecurityStatus, SoftwareItem,
    Temperature,
};
use crate::error::CollectError;
use crate::executor::CommandExecutor;
use crate::runner::CommandLine;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Filesystems that never represent user storage.
pub const PSEUDO_FS: &[&str] = &[
    "tmpfs",
    "devtmpfs",
    "squashfs",
    "overlay",
    "proc",
    "sysfs",
    "cgroup",
    "cgroup2",
    "devpts",
    "securityfs",
    "debugfs",
    "tracefs",
    "configfs",
    "fusectl",
    "mqueue",
    "hugetlbfs",
    "pstore",
    "bpf",
    "autofs",
    "ramfs",
    "nsfs",
    "efivarfs",
    "binfmt_misc",
    "iso9660",
    "devfs",
    "none",
];

pub fn is_virtual_mount(fstype: &str, mount: &str) -> bool {
    let fstype = fstype.to_ascii_lowercase();
    PSEUDO_FS.contains(&fstype.as_str())
        || mount.starts_with("/snap/")
        || mount.starts_with("/proc")
        || mount.starts_with("/sys/")
        || mount.starts_with("/dev/")
        || mount.starts_with("/System/Volumes/VM")
        || mount.starts_with("/System/Volumes/Preboot")
}

pub(crate) async fn read_file(path: &str) -> Result<String, CollectError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|err| CollectError::from_io(path, err))
}

async fn read_trimmed(path: &str) -> Option<String> {
    read_file(path).await.ok().and_then(|s| non_empty(&s))
}

pub fn parse_diskstats(text: &str) -> HashMap<String, DiskIo> {
    text.lines()
        .filter_map(|line| {
            let f: Vec<&str> = line.split_whitespace().collect();
            if f.len() < 10 {
                return None;
            }
            let num = |i: usize| f[i].parse::<u64>().unwrap_or(0);
            Some((
                f[2].to_string(),
                DiskIo {
                    read_ops: num(3),
                    read_bytes: num(5).saturating_mul(512),
                    write_ops: num(7),
                    write_bytes: num(9).saturating_mul(512),
                },
            ))
        })
        .collect()
}

pub async fn disk_io() -> Result<HashMap<String, DiskIo>, CollectError> {
    Ok(parse_diskstats(&read_file("/proc/diskstats").await?))
}

#[derive(Debug, Deserialize)]
struct IpLink {
    ifname: String,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    mtu: Option<u32>,
    #[serde(default)]
    operstate: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
    family: String,
    local: String,
    #[serde(default)]
    prefixlen: Option<u8>,
}

/// Parses `ip -j addr show`.
pub fn parse_ip_addr_json(text: &str) -> Result<Vec<NetInterface>, CollectError> {
    let links: Vec<IpLink> = serde_json::from_str(text)
        .map_err(|err| CollectError::malformed(format!("ip -j addr: {err}")))?;

    Ok(links
        .into_iter()
        .map(|link| {
            let operstate = link.operstate.unwrap_or_default();
            let up = link.flags.iter().any(|f| f == "UP") && operstate != "DOWN";
            let fmt_addr = |a: &IpAddrInfo| match a.prefixlen {
                Some(p) => format!("{}/{}", a.local, p),
                None => a.local.clone(),
            };
            NetInterface {
                name: link.ifname,
                up,
                mtu: link.mtu,
                mac: link.address.unwrap_or_default(),
                ipv4: link
                    .addr_info
                    .iter()
                    .filter(|a| a.family == "inet")
                    .map(fmt_addr)
                    .collect(),
                ipv6: link
                    .addr_info
                    .iter()
                    .filter(|a| a.family == "inet6")
                    .map(fmt_addr)
                    .collect(),
                ..NetInterface::default()
            }
        })
        .collect())
}

/// Applies `/proc/net/dev` counters to matching interfaces.
pub fn apply_proc_net_dev(text: &str, ifaces: &mut [NetInterface]) {
    for line in text.lines().skip(2) {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let f: Vec<u64> = rest
            .split_whitespace()
            .map(|v| v.parse().unwrap_or(0))
            .collect();
        if f.len() < 12 {
            continue;
        }
        if let Some(iface) = ifaces.iter_mut().find(|i| i.name == name) {
            iface.bytes_recv = f[0];
            iface.packets_recv = f[1];
            iface.errin = f[2];
            iface.dropin = f[3];
            iface.bytes_sent = f[8];
            iface.packets_sent = f[9];
            iface.errout = f[10];
            iface.dropout = f[11];
        }
    }
}

pub async fn net_ifaces(exec: &CommandExecutor) -> Result<Vec<NetInterface>, CollectError> {
    let json = exec
        .run(&CommandLine::new("ip").args(["-j", "addr", "show"]))
        .await?;
    let mut ifaces = parse_ip_addr_json(&json)?;

    match read_file("/proc/net/dev").await {
        Ok(text) => apply_proc_net_dev(&text, &mut ifaces),
        Err(err) => debug!(error = %err, "no /proc/net/dev counters"),
    }
    for iface in &mut ifaces {
        let path = format!("/sys/class/net/{}/speed", iface.name);
        iface.speed_mbps = read_trimmed(&path)
            .await
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|v| *v > 0)
            .map(|v| v as u64);
    }
    Ok(ifaces)
}

fn normalize_ss_state(state: &str) -> String {
    match state {
        "ESTAB" => "ESTABLISHED".to_string(),
        "UNCONN" => "CLOSE".to_string(),
        other => other.replace('-', "_"),
    }
}

fn pid_from_users(field: &str) -> Option<u32> {
    let start = field.find("pid=")? + 4;
    let digits: String = field[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Parses `ss -tanpH` output.
pub fn parse_ss(text: &str) -> Vec<Connection> {
    text.lines()
        .filter_map(|line| {
            let f: Vec<&str> = line.split_whitespace().collect();
            if f.len() < 5 {
                return None;
            }
            Some(Connection {
                proto: "TCP".to_string(),
                local: f[3].to_string(),
                remote: f[4].to_string(),
                status: normalize_ss_state(f[0]),
                pid: f.get(5).and_then(|u| pid_from_users(u)),
            })
        })
        .collect()
}

pub async fn net_connections(exec: &CommandExecutor) -> Result<Vec<Connection>, CollectError> {
    let text = exec
        .run(&CommandLine::new("ss").arg("-tanpH"))
        .await?;
    Ok(parse_ss(&text))
}

/// Returns `(nice, num_threads)` from `/proc/<pid>/stat`.
pub fn parse_proc_stat(text: &str) -> Option<(i32, u32)> {
    let after = &text[text.rfind(')')? + 1..];
    let f: Vec<&str> = after.split_whitespace().collect();
    let nice = f.get(16)?.parse().ok()?;
    let threads = f.get(17)?.parse().ok()?;
    Some((nice, threads))
}

pub async fn proc_stat(pid: u32) -> Option<(i32, u32)> {
    let text = read_file(&format!("/proc/{pid}/stat")).await.ok()?;
    parse_proc_stat(&text)
}

pub async fn thermal_zones() -> Vec<Temperature> {
    let Ok(mut entries) = tokio::fs::read_dir("/sys/class/thermal").await else {
        return Vec::new();
    };

    let mut out = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|v| v.to_str()) else {
            continue;
        };
        if !name.starts_with("thermal_zone") {
            continue;
        }
        let base = path.display().to_string();
        let label = read_trimmed(&format!("{base}/type"))
            .await
            .unwrap_or_else(|| name.to_string());
        let Some(v) = read_trimmed(&format!("{base}/temp"))
            .await
            .and_then(|s| s.parse::<f64>().ok())
        else {
            continue;
        };
        let celsius = if v > 1000.0 { v / 1000.0 } else { v };
        if celsius > 0.0 {
            out.push(Temperature {
                label,
                current_c: celsius,
                high_c: None,
                critical_c: None,
            });
        }
    }
    out
}

pub async fn max_cpu_mhz() -> Option<u64> {
    read_trimmed("/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq")
        .await
        .and_then(|khz| khz.parse::<u64>().ok())
        .map(|khz| khz / 1000)
}

pub fn battery_from_sysfs(
    capacity: &str,
    status: &str,
    energy_now: Option<u64>,
    power_now: Option<u64>,
) -> Result<BatteryInfo, CollectError> {
    let percent = capacity
        .trim()
        .parse::<f64>()
        .map_err(|_| CollectError::malformed(format!("battery capacity '{capacity}'")))?;
    let plugged = !status.trim().eq_ignore_ascii_case("discharging");
    let time_left = match (plugged, energy_now, power_now) {
        (true, _, _) => BatteryTime::Unlimited,
        (false, Some(energy), Some(power)) if power > 0 => {
            BatteryTime::Seconds(energy.saturating_mul(3600) / power)
        }
        _ => BatteryTime::Unknown,
    };
    Ok(BatteryInfo {
        percent,
        plugged,
        time_left,
    })
}

pub async fn battery() -> Result<BatteryInfo, CollectError> {
    let mut entries = tokio::fs::read_dir("/sys/class/power_supply")
        .await
        .map_err(|err| CollectError::from_io("/sys/class/power_supply", err))?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let base = entry.path().display().to_string();
        if read_trimmed(&format!("{base}/type")).await.as_deref() != Some("Battery") {
            continue;
        }
        let capacity = read_file(&format!("{base}/capacity")).await?;
        let status = read_trimmed(&format!("{base}/status"))
            .await
            .unwrap_or_default();
        let energy = match read_trimmed(&format!("{base}/energy_now")).await {
            Some(v) => v.parse().ok(),
            None => read_trimmed(&format!("{base}/charge_now"))
                .await
                .and_then(|v| v.parse().ok()),
        };
        let power = match read_trimmed(&format!("{base}/power_now")).await {
            Some(v) => v.parse().ok(),
            None => read_trimmed(&format!("{base}/current_now"))
                .await
                .and_then(|v| v.parse().ok()),
        };
        return battery_from_sysfs(&capacity, &status, energy, power);
    }
    Err(CollectError::unsupported("no battery present"))
}

/// Parses `who` output (Linux and BSD layouts).
pub fn parse_who(text: &str) -> Vec<LoggedInUser> {
    text.lines()
        .filter_map(|line| {
            let mut f: Vec<&str> = line.split_whitespace().collect();
            if f.len() < 3 {
                return None;
            }
            let host = match f.last() {
                Some(last) if last.starts_with('(') => {
                    let h = last.trim_matches(|c| c == '(' || c == ')').to_string();
                    f.pop();
                    h
                }
                _ => String::new(),
            };
            Some(LoggedInUser {
                name: f[0].to_string(),
                terminal: f[1].to_string(),
                host,
                started: f[2..].join(" "),
                pid: None,
            })
        })
        .collect()
}

pub async fn users_current(exec: &CommandExecutor) -> Result<Vec<LoggedInUser>, CollectError> {
    Ok(parse_who(&exec.run(&CommandLine::new("who")).await?))
}

const WEEKDAYS: &[&str] = &["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Parses `last` output into session records.
pub fn parse_last(text: &str) -> Vec<LoginRecord> {
    text.lines()
        .filter_map(|line| {
            let f: Vec<&str> = line.split_whitespace().collect();
            if f.len() < 4 || line.contains(" begins ") {
                return None;
            }
            let wd = (2..f.len()).find(|&i| WEEKDAYS.contains(&f[i]))?;
            let (terminal, host) = if wd >= 3 {
                (f[1..wd - 1].join(" "), f[wd - 1].to_string())
            } else {
                (f[1..wd].join(" "), String::new())
            };
            let end = (wd + 4).min(f.len());
            Some(LoginRecord {
                user: f[0].to_string(),
                terminal,
                host,
                started: f[wd..end].join(" "),
                duration: f[end..].join(" "),
            })
        })
        .collect()
}

pub async fn recent_logins(exec: &CommandExecutor) -> Result<Vec<LoginRecord>, CollectError> {
    Ok(parse_last(
        &exec.run(&CommandLine::new("last").arg("-20")).await?,
    ))
}

/// `TZ`, then the `/etc/localtime` link target, then `date +%Z`.
pub async fn timezone(exec: &CommandExecutor) -> Result<String, CollectError> {
    if let Some(tz) = std::env::var("TZ").ok().and_then(|v| non_empty(&v)) {
        return Ok(tz);
    }
    if let Ok(target) = tokio::fs::read_link("/etc/localtime").await {
        let path = target.to_string_lossy().to_string();
        for prefix in ["/usr/share/zoneinfo/", "/var/db/timezone/zoneinfo/"] {
            if let Some(idx) = path.find(prefix) {
                return Ok(path[idx + prefix.len()..].to_string());
            }
        }
    }
    let out = exec.run(&CommandLine::new("date").arg("+%Z")).await?;
    non_empty(&out).ok_or_else(|| CollectError::malformed("empty `date +%Z` output"))
}

pub async fn firmware() -> Result<FirmwareInfo, CollectError> {
    const DMI: &str = "/sys/class/dmi/id";
    let info = FirmwareInfo {
        bios_vendor: read_trimmed(&format!("{DMI}/bios_vendor")).await,
        bios_version: read_trimmed(&format!("{DMI}/bios_version")).await,
        bios_date: read_trimmed(&format!("{DMI}/bios_date")).await,
        board_vendor: read_trimmed(&format!("{DMI}/board_vendor")).await,
        board_model: read_trimmed(&format!("{DMI}/board_name")).await,
        system_vendor: read_trimmed(&format!("{DMI}/sys_vendor")).await,
        system_product: read_trimmed(&format!("{DMI}/product_name")).await,
        uuid: read_trimmed(&format!("{DMI}/product_uuid")).await,
        serial: read_trimmed(&format!("{DMI}/product_serial")).await,
    };
    if info == FirmwareInfo::default() {
        return Err(CollectError::unsupported("no DMI data exposed"));
    }
    Ok(info)
}

/// Parses `nvidia-smi --query-gpu=name,memory.total,driver_version
/// --format=csv,noheader,nounits`.
pub fn parse_nvidia_smi(text: &str) -> Vec<GpuInfo> {
    text.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            if parts.len() < 3 || parts[0].is_empty() {
                return None;
            }
            Some(GpuInfo {
                name: parts[0].to_string(),
                adapter_ram_bytes: parse_u64_loose(parts[1]).map(|mib| mib * 1024 * 1024),
                driver_version: non_empty(parts[2]),
                processor: Some("NVIDIA".to_string()),
            })
        })
        .collect()
}

fn quoted_fields(line: &str) -> Vec<String> {
    line.split('"')
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect()
}

/// Parses `lspci -mm`, keeping display controllers.
pub fn parse_lspci(text: &str) -> Vec<GpuInfo> {
    text.lines()
        .filter_map(|line| {
            let q = quoted_fields(line);
            if q.len() < 3 {
                return None;
            }
            let class = q[0].as_str();
            if !(class.contains("VGA") || class.contains("3D") || class.contains("Display")) {
                return None;
            }
            Some(GpuInfo {
                name: format!("{} {}", q[1], q[2]),
                adapter_ram_bytes: None,
                driver_version: None,
                processor: Some(class.to_string()),
            })
        })
        .collect()
}

pub async fn gpus(exec: &CommandExecutor) -> Result<Vec<GpuInfo>, CollectError> {
    let nvidia = CommandLine::new("nvidia-smi").args([
        "--query-gpu=name,memory.total,driver_version",
        "--format=csv,noheader,nounits",
    ]);
    match exec.run(&nvidia).await {
        Ok(text) if !parse_nvidia_smi(&text).is_empty() => return Ok(parse_nvidia_smi(&text)),
        Ok(_) => {}
        Err(err) => debug!(error = %err, "nvidia-smi unavailable, trying lspci"),
    }
    let text = exec.run(&CommandLine::new("lspci").arg("-mm")).await?;
    Ok(parse_lspci(&text))
}

const ADMIN_GROUPS: &[&str] = &["sudo", "wheel", "admin"];

/// Builds login-capable accounts from `/etc/passwd` and `/etc/group`.
pub fn parse_passwd(passwd: &str, group: &str) -> Vec<LocalAccount> {
    let admins: HashSet<&str> = group
        .lines()
        .filter_map(|line| {
            let f: Vec<&str> = line.split(':').collect();
            (f.len() >= 4 && ADMIN_GROUPS.contains(&f[0])).then(|| f[3])
        })
        .flat_map(|members| members.split(',').map(str::trim))
        .filter(|m| !m.is_empty())
        .collect();

    passwd
        .lines()
        .filter_map(|line| {
            let f: Vec<&str> = line.split(':').collect();
            if f.len() < 7 {
                return None;
            }
            let uid: u32 = f[2].parse().ok()?;
            if uid != 0 && (uid < 1000 || uid == 65534) {
                return None;
            }
            let shell = f[6].trim();
            Some(LocalAccount {
                name: f[0].to_string(),
                full_name: f[4].split(',').next().unwrap_or_default().to_string(),
                uid: uid.to_string(),
                home: f[5].to_string(),
                shell: shell.to_string(),
                enabled: !(shell.ends_with("nologin") || shell.ends_with("false")),
                is_admin: uid == 0 || admins.contains(f[0]),
            })
        })
        .collect()
}

pub async fn local_accounts() -> Result<Vec<LocalAccount>, CollectError> {
    let passwd = read_file("/etc/passwd").await?;
    let group = read_file("/etc/group").await.unwrap_or_default();
    Ok(parse_passwd(&passwd, &group))
}

/// Parses `name|version|publisher|install_date` lines.
pub fn parse_pipe_software(text: &str) -> Vec<SoftwareItem> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split('|').map(str::trim);
            let name = parts.next().filter(|n| !n.is_empty())?;
            Some(SoftwareItem {
                name: name.to_string(),
                version: parts.next().unwrap_or_default().to_string(),
                publisher: parts.next().unwrap_or_default().to_string(),
                install_date: parts.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

pub async fn installed_software(exec: &CommandExecutor) -> Result<Vec<SoftwareItem>, CollectError> {
    let dpkg = CommandLine::new("dpkg-query")
        .args(["-W", "-f=${Package}|${Version}|${Maintainer}|\n"]);
    match exec.run(&dpkg).await {
        Ok(text) => return Ok(parse_pipe_software(&text)),
        Err(err) => debug!(error = %err, "dpkg-query unavailable, trying rpm"),
    }
    let rpm = CommandLine::new("rpm").args([
        "-qa",
        "--queryformat",
        "%{NAME}|%{VERSION}-%{RELEASE}|%{VENDOR}|%{INSTALLTIME:date}\n",
    ]);
    Ok(parse_pipe_software(&exec.run(&rpm).await?))
}

pub fn parse_sshd_permit_root(config: &str) -> Option<String> {
    config.lines().map(str::trim).find_map(|line| {
        if line.starts_with('#') {
            return None;
        }
        let mut f = line.split_whitespace();
        match (f.next(), f.next()) {
            (Some(k), Some(v)) if k.eq_ignore_ascii_case("PermitRootLogin") => Some(v.to_string()),
            _ => None,
        }
    })
}

pub fn parse_ufw_status(text: &str) -> Option<String> {
    text.lines().find_map(|l| {
        l.trim()
            .strip_prefix("Status:")
            .map(|s| match s.trim() {
                "active" => "On (ufw)".to_string(),
                other => format!("Off (ufw {other})"),
            })
    })
}

#[cfg(unix)]
pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
    false
}

async fn firewall_state(exec: &CommandExecutor) -> String {
    match exec.run(&CommandLine::new("ufw").arg("status")).await {
        Ok(text) => {
            if let Some(state) = parse_ufw_status(&text) {
                return state;
            }
        }
        Err(CollectError::Exit { .. }) | Err(CollectError::PermissionDenied(_)) => {
            return "Unknown (ufw requires root)".to_string();
        }
        Err(_) => {}
    }
    match exec.run(&CommandLine::new("firewall-cmd").arg("--state")).await {
        Ok(text) if text.trim() == "running" => "On (firewalld)".to_string(),
        Ok(_) | Err(CollectError::Exit { .. }) => "Off (firewalld)".to_string(),
        Err(_) => "Not detected".to_string(),
    }
}

pub async fn security_status(exec: &CommandExecutor) -> Result<SecurityStatus, CollectError> {
    let antivirus = match exec.run(&CommandLine::new("clamscan").arg("--version")).await {
        Ok(v) => non_empty(&v).unwrap_or_else(|| "ClamAV".to_string()),
        Err(_) => "Not detected".to_string(),
    };
    let firewall = firewall_state(exec).await;

    let mut extra = Vec::new();
    if let Ok(mode) = exec.run(&CommandLine::new("getenforce")).await {
        extra.push(("SELinux".to_string(), mode.trim().to_string()));
    }
    if let Some(v) = read_trimmed("/sys/module/apparmor/parameters/enabled").await {
        let state = if v == "Y" { "Enabled" } else { "Disabled" };
        extra.push(("AppArmor".to_string(), state.to_string()));
    }
    if let Ok(cfg) = read_file("/etc/ssh/sshd_config").await {
        let permit = parse_sshd_permit_root(&cfg).unwrap_or_else(|| "default".to_string());
        extra.push(("SSH PermitRootLogin".to_string(), permit));
    }

    Ok(SecurityStatus {
        antivirus,
        firewall,
        uac: "N/A".to_string(),
        is_admin: is_elevated(),
        extra,
    })
}

pub async fn power_plan() -> Result<String, CollectError> {
    if let Some(profile) = read_trimmed("/sys/firmware/acpi/platform_profile").await {
        return Ok(profile);
    }
    read_trimmed("/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor")
        .await
        .map(|g| format!("{g} (cpufreq governor)"))
        .ok_or_else(|| CollectError::unsupported("no platform profile or cpufreq governor"))
}
