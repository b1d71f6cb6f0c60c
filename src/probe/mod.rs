pub mod linux;
pub mod macos;
pub mod native;
pub mod windows;

use crate::error::CollectError;
use crate::runner::Os;
use async_trait::async_trait;
use chrono::{DateTime, Local};

pub use native::NativeProbe;

#[derive(Debug, Clone, PartialEq)]
pub struct HostRecord {
    pub hostname: String,
    pub platform: String,
    pub kernel: Option<String>,
    pub architecture: String,
    pub machine_type: String,
    pub bits: u32,
    pub runtime_version: String,
}

/// All values in bytes; percentages in 0..=100.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryInfo {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub percent: f64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuInfo {
    pub brand: String,
    pub physical_cores: Option<usize>,
    pub logical_cores: usize,
    pub current_mhz: u64,
    pub max_mhz: Option<u64>,
    pub overall_percent: f64,
    pub per_core_percent: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskInfo {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
    pub io: Option<DiskIo>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetInterface {
    pub name: String,
    pub up: bool,
    pub mtu: Option<u32>,
    pub speed_mbps: Option<u64>,
    pub mac: String,
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
    pub dropin: u64,
    pub dropout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub proto: String,
    pub local: String,
    pub remote: String,
    /// Upper-case TCP state name, e.g. `ESTABLISHED`.
    pub status: String,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: Option<u32>,
    pub name: String,
    pub user: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub rss: u64,
    pub vms: u64,
    pub num_threads: Option<u32>,
    pub status: String,
    pub nice: Option<i32>,
    /// Unix seconds.
    pub create_time: u64,
    pub exe_path: String,
    pub cmdline: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Temperature {
    pub label: String,
    pub current_c: f64,
    pub high_c: Option<f64>,
    pub critical_c: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryTime {
    Seconds(u64),
    Unlimited,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatteryInfo {
    pub percent: f64,
    pub plugged: bool,
    pub time_left: BatteryTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggedInUser {
    pub name: String,
    pub terminal: String,
    pub host: String,
    pub started: String,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInfo {
    pub name: String,
    pub display_name: String,
    pub status: String,
    pub start_type: String,
    pub pid: Option<u32>,
    pub binpath: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WifiProfile {
    pub ssid: String,
    pub authentication: String,
    pub cipher: String,
    /// Whether a key is stored (`Present`/`Absent`); the key itself is never read.
    pub key: String,
    pub connection_mode: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FirmwareInfo {
    pub bios_vendor: Option<String>,
    pub bios_version: Option<String>,
    pub bios_date: Option<String>,
    pub board_vendor: Option<String>,
    pub board_model: Option<String>,
    pub system_vendor: Option<String>,
    pub system_product: Option<String>,
    pub uuid: Option<String>,
    pub serial: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuInfo {
    pub name: String,
    pub adapter_ram_bytes: Option<u64>,
    pub driver_version: Option<String>,
    pub processor: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalAccount {
    pub name: String,
    pub full_name: String,
    pub uid: String,
    pub home: String,
    pub shell: String,
    pub enabled: bool,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareItem {
    pub name: String,
    pub version: String,
    pub publisher: String,
    pub install_date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverInfo {
    pub name: String,
    pub display_name: String,
    pub state: String,
    pub start_mode: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityStatus {
    pub antivirus: String,
    pub firewall: String,
    pub uac: String,
    pub is_admin: bool,
    pub extra: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginRecord {
    pub user: String,
    pub terminal: String,
    pub host: String,
    pub started: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub time: String,
    pub level: String,
    pub source: String,
    pub event_id: String,
    pub message: String,
}

fn unsupported<T>(op: &str) -> Result<T, CollectError> {
    Err(CollectError::unsupported(format!("{op} is not available on this platform")))
}

/// OS-level lookups behind one interface. Every operation may return
/// `Unsupported`; the optional ones default to it.
#[async_trait]
pub trait PlatformProbe: Send + Sync {
    fn os(&self) -> Os;

    async fn host_info(&self) -> Result<HostRecord, CollectError>;
    async fn memory(&self) -> Result<MemoryInfo, CollectError>;
    async fn cpu(&self) -> Result<CpuInfo, CollectError>;
    async fn disks(&self) -> Result<Vec<DiskInfo>, CollectError>;
    async fn net_ifaces(&self) -> Result<Vec<NetInterface>, CollectError>;
    async fn processes(&self) -> Result<Vec<ProcessInfo>, CollectError>;
    async fn boot_time(&self) -> Result<DateTime<Local>, CollectError>;

    async fn net_connections(&self) -> Result<Vec<Connection>, CollectError> {
        unsupported("net_connections")
    }
    async fn sensors_temperatures(&self) -> Result<Vec<Temperature>, CollectError> {
        unsupported("sensors_temperatures")
    }
    async fn battery(&self) -> Result<BatteryInfo, CollectError> {
        unsupported("battery")
    }
    async fn users_current(&self) -> Result<Vec<LoggedInUser>, CollectError> {
        unsupported("users_current")
    }
    async fn services(&self) -> Result<Vec<ServiceInfo>, CollectError> {
        unsupported("services")
    }
    async fn wifi_profiles(&self) -> Result<Vec<String>, CollectError> {
        unsupported("wifi_profiles")
    }
    async fn wifi_profile_detail(&self, _name: &str) -> Result<WifiProfile, CollectError> {
        unsupported("wifi_profile_detail")
    }
    async fn firmware(&self) -> Result<FirmwareInfo, CollectError> {
        unsupported("firmware")
    }
    async fn gpus(&self) -> Result<Vec<GpuInfo>, CollectError> {
        unsupported("gpus")
    }
    async fn local_accounts(&self) -> Result<Vec<LocalAccount>, CollectError> {
        unsupported("local_accounts")
    }
    async fn installed_software(&self) -> Result<Vec<SoftwareItem>, CollectError> {
        unsupported("installed_software")
    }
    async fn drivers(&self) -> Result<Vec<DriverInfo>, CollectError> {
        unsupported("drivers")
    }
    async fn security_status(&self) -> Result<SecurityStatus, CollectError> {
        unsupported("security_status")
    }
    async fn recent_logins(&self) -> Result<Vec<LoginRecord>, CollectError> {
        unsupported("recent_logins")
    }
    async fn events(&self, _limit: usize) -> Result<Vec<EventRecord>, CollectError> {
        unsupported("events")
    }
    async fn power_plan(&self) -> Result<String, CollectError> {
        unsupported("power_plan")
    }
    async fn timezone(&self) -> Result<String, CollectError> {
        unsupported("timezone")
    }
    async fn environment(&self) -> Result<Vec<(String, String)>, CollectError> {
        Ok(std::env::vars().collect())
    }
}

/// Lenient number parsing for tool output: tolerates units, spaces and a
/// decimal comma.
pub fn parse_f64_loose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }
    if let Ok(v) = trimmed.replace(',', ".").parse::<f64>() {
        return Some(v);
    }

    let filtered: String = trimmed
        .chars()
        .take_while(|c| !c.is_whitespace() || c.is_ascii_digit())
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+'))
        .collect();
    if filtered.is_empty() {
        return None;
    }
    filtered.replace(',', ".").parse::<f64>().ok()
}

pub fn parse_u64_loose(input: &str) -> Option<u64> {
    parse_f64_loose(input).map(|v| if v < 0.0 { 0 } else { v as u64 })
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}
