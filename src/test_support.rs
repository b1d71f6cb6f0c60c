//! Fakes shared by the unit tests.

use crate::cancel::CancelToken;
use crate::collectors::{CollectContext, Collector, CollectorSpec, ANY};
use crate::error::CollectError;
use crate::probe::*;
use crate::report::{Section, SectionKind};
use crate::runner::{CommandLine, CommandOutput, CommandRunner, Os};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

enum Reply {
    Text(String),
    Fail(CollectError),
    Hang(Duration),
}

/// Answers commands by their display string. Unknown commands behave like a
/// binary missing from PATH.
#[derive(Default)]
pub struct MockRunner {
    replies: HashMap<String, Reply>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: &str, text: &str) -> Self {
        self.replies
            .insert(command.to_string(), Reply::Text(text.to_string()));
        self
    }

    pub fn fail(mut self, command: &str, err: CollectError) -> Self {
        self.replies.insert(command.to_string(), Reply::Fail(err));
        self
    }

    /// The command runs for `duration` before printing nothing.
    pub fn hang(mut self, command: &str, duration: Duration) -> Self {
        self.replies
            .insert(command.to_string(), Reply::Hang(duration));
        self
    }

    pub fn calls(&self, command: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.get(command).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        cmd: &CommandLine,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<CommandOutput, CollectError> {
        let key = cmd.to_string();
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(key.clone()).or_default() += 1;
        }
        let output = |text: &str| CommandOutput {
            text: text.to_string(),
            duration: Duration::ZERO,
        };
        match self.replies.get(&key) {
            Some(Reply::Text(text)) => Ok(output(text)),
            Some(Reply::Fail(err)) => Err(err.clone()),
            Some(Reply::Hang(duration)) => {
                tokio::select! {
                    _ = tokio::time::sleep(*duration) => Ok(output("")),
                    _ = tokio::time::sleep(timeout) => Err(CollectError::Timeout(timeout)),
                    _ = cancel.canceled() => Err(CollectError::Canceled),
                }
            }
            None => Err(CollectError::unsupported(format!("`{key}` is not on PATH"))),
        }
    }
}

fn unsupported<T>(what: &str) -> Result<T, CollectError> {
    Err(CollectError::unsupported(format!("{what} is not mocked")))
}

/// A probe with canned answers. Defaults describe a calm Linux box: 10% CPU,
/// 40% of 16 GiB memory, one disk at 12%, no sensors.
#[derive(Clone)]
pub struct MockProbe {
    pub os: Os,
    pub host: Result<HostRecord, CollectError>,
    pub memory: Result<MemoryInfo, CollectError>,
    pub cpu: Result<CpuInfo, CollectError>,
    pub disks: Result<Vec<DiskInfo>, CollectError>,
    pub ifaces: Result<Vec<NetInterface>, CollectError>,
    pub connections: Result<Vec<Connection>, CollectError>,
    pub processes: Result<Vec<ProcessInfo>, CollectError>,
    pub temperatures: Result<Vec<Temperature>, CollectError>,
    pub battery: Result<BatteryInfo, CollectError>,
    pub boot_time: Result<DateTime<Local>, CollectError>,
    pub users: Result<Vec<LoggedInUser>, CollectError>,
    pub services: Result<Vec<ServiceInfo>, CollectError>,
    pub wifi: Result<Vec<String>, CollectError>,
    pub wifi_details: HashMap<String, WifiProfile>,
    pub firmware: Result<FirmwareInfo, CollectError>,
    pub gpus: Result<Vec<GpuInfo>, CollectError>,
    pub accounts: Result<Vec<LocalAccount>, CollectError>,
    pub software: Result<Vec<SoftwareItem>, CollectError>,
    pub drivers: Result<Vec<DriverInfo>, CollectError>,
    pub security: Result<SecurityStatus, CollectError>,
    pub logins: Result<Vec<LoginRecord>, CollectError>,
    pub events: Result<Vec<EventRecord>, CollectError>,
    pub power_plan: Result<String, CollectError>,
    pub timezone: Result<String, CollectError>,
    pub environment: Result<Vec<(String, String)>, CollectError>,
}

pub const SIXTEEN_GIB: u64 = 17_179_869_184;

pub fn process(pid: u32, name: &str, cpu: f64, status: &str) -> ProcessInfo {
    ProcessInfo {
        pid,
        ppid: Some(1),
        name: name.to_string(),
        user: "alice".to_string(),
        cpu_percent: cpu,
        mem_percent: 1.5,
        rss: 64 * 1024 * 1024,
        vms: 256 * 1024 * 1024,
        num_threads: Some(4),
        status: status.to_string(),
        nice: Some(0),
        create_time: 1_705_305_600,
        exe_path: format!("/usr/bin/{name}"),
        cmdline: format!("/usr/bin/{name} --serve"),
    }
}

pub fn disk(mountpoint: &str, percent: f64) -> DiskInfo {
    let total = 100 * 1024 * 1024 * 1024_u64;
    let used = (total as f64 * percent / 100.0) as u64;
    DiskInfo {
        device: "/dev/sda1".to_string(),
        mountpoint: mountpoint.to_string(),
        fstype: "ext4".to_string(),
        total,
        used,
        free: total - used,
        percent,
        io: Some(DiskIo {
            read_bytes: 1024 * 1024,
            write_bytes: 2 * 1024 * 1024,
            read_ops: 10,
            write_ops: 20,
        }),
    }
}

impl MockProbe {
    pub fn new(os: Os) -> Self {
        let used = SIXTEEN_GIB * 2 / 5;
        Self {
            os,
            host: Ok(HostRecord {
                hostname: "testbox".to_string(),
                platform: format!("{os} 6.1"),
                kernel: Some("6.1.0".to_string()),
                architecture: "x86_64".to_string(),
                machine_type: "x86_64".to_string(),
                bits: 64,
                runtime_version: "hostscope 0.1.0".to_string(),
            }),
            memory: Ok(MemoryInfo {
                total: SIXTEEN_GIB,
                available: SIXTEEN_GIB - used,
                used,
                percent: 40.0,
                swap_total: 0,
                swap_used: 0,
                swap_percent: 0.0,
            }),
            cpu: Ok(CpuInfo {
                brand: "Test CPU @ 2.40GHz".to_string(),
                physical_cores: Some(4),
                logical_cores: 8,
                current_mhz: 2400,
                max_mhz: Some(3600),
                overall_percent: 10.0,
                per_core_percent: vec![10.0; 8],
            }),
            disks: Ok(vec![disk("/", 12.0)]),
            ifaces: Ok(vec![NetInterface {
                name: "eth0".to_string(),
                up: true,
                mtu: Some(1500),
                speed_mbps: Some(1000),
                mac: "52:54:00:12:34:56".to_string(),
                ipv4: vec!["192.168.1.10/24".to_string()],
                bytes_sent: 1000,
                bytes_recv: 2000,
                ..NetInterface::default()
            }]),
            connections: Ok(vec![
                Connection {
                    proto: "TCP".to_string(),
                    local: "192.168.1.10:50000".to_string(),
                    remote: "20.1.2.3:443".to_string(),
                    status: "ESTABLISHED".to_string(),
                    pid: Some(4321),
                },
                Connection {
                    proto: "TCP".to_string(),
                    local: "0.0.0.0:22".to_string(),
                    remote: "0.0.0.0:0".to_string(),
                    status: "LISTEN".to_string(),
                    pid: Some(900),
                },
            ]),
            processes: Ok(vec![
                process(10, "sshd", 0.5, "Sleeping"),
                process(20, "postgres", 4.0, "Runnable"),
            ]),
            temperatures: unsupported("sensors"),
            battery: unsupported("battery"),
            boot_time: Local
                .with_ymd_and_hms(2024, 1, 15, 8, 0, 0)
                .single()
                .ok_or_else(|| CollectError::malformed("boot time")),
            users: Ok(vec![LoggedInUser {
                name: "alice".to_string(),
                terminal: "pts/0".to_string(),
                host: "10.0.0.5".to_string(),
                started: "2024-01-15 09:12".to_string(),
                pid: Some(1234),
            }]),
            services: unsupported("services"),
            wifi: unsupported("wifi"),
            wifi_details: HashMap::new(),
            firmware: Ok(FirmwareInfo {
                bios_vendor: Some("SeaBIOS".to_string()),
                bios_version: Some("1.16.2".to_string()),
                system_vendor: Some("QEMU".to_string()),
                system_product: Some("Standard PC (Q35 + ICH9, 2009)".to_string()),
                uuid: Some("4c4c4544-0042".to_string()),
                ..FirmwareInfo::default()
            }),
            gpus: Ok(Vec::new()),
            accounts: Ok(vec![
                LocalAccount {
                    name: "root".to_string(),
                    full_name: "root".to_string(),
                    uid: "0".to_string(),
                    home: "/root".to_string(),
                    shell: "/bin/bash".to_string(),
                    enabled: true,
                    is_admin: true,
                },
                LocalAccount {
                    name: "alice".to_string(),
                    full_name: "Alice".to_string(),
                    uid: "1000".to_string(),
                    home: "/home/alice".to_string(),
                    shell: "/bin/zsh".to_string(),
                    enabled: true,
                    is_admin: false,
                },
            ]),
            software: Ok(vec![
                SoftwareItem {
                    name: "curl".to_string(),
                    version: "7.88.1".to_string(),
                    publisher: "Debian".to_string(),
                    install_date: String::new(),
                },
                SoftwareItem {
                    name: "Curl".to_string(),
                    version: "7.88.0".to_string(),
                    publisher: "Debian".to_string(),
                    install_date: String::new(),
                },
            ]),
            drivers: unsupported("drivers"),
            security: Ok(SecurityStatus {
                antivirus: "Not detected".to_string(),
                firewall: "On (ufw)".to_string(),
                uac: "N/A".to_string(),
                is_admin: false,
                extra: vec![("AppArmor".to_string(), "Enabled".to_string())],
            }),
            logins: Ok(vec![LoginRecord {
                user: "reboot".to_string(),
                terminal: "system boot".to_string(),
                host: "6.1.0".to_string(),
                started: "Mon Jan 15 08:00".to_string(),
                duration: "still running".to_string(),
            }]),
            events: unsupported("events"),
            power_plan: Ok("balanced".to_string()),
            timezone: Ok("UTC".to_string()),
            environment: Ok(vec![
                ("PATH".to_string(), "/usr/bin:/bin".to_string()),
                ("DB_PASSWORD".to_string(), "hunter2".to_string()),
                ("API_TOKEN".to_string(), "xyz".to_string()),
                ("HOME".to_string(), "/home/alice".to_string()),
            ]),
        }
    }
}

#[async_trait]
impl PlatformProbe for MockProbe {
    fn os(&self) -> Os {
        self.os
    }
    async fn host_info(&self) -> Result<HostRecord, CollectError> {
        self.host.clone()
    }
    async fn memory(&self) -> Result<MemoryInfo, CollectError> {
        self.memory.clone()
    }
    async fn cpu(&self) -> Result<CpuInfo, CollectError> {
        self.cpu.clone()
    }
    async fn disks(&self) -> Result<Vec<DiskInfo>, CollectError> {
        self.disks.clone()
    }
    async fn net_ifaces(&self) -> Result<Vec<NetInterface>, CollectError> {
        self.ifaces.clone()
    }
    async fn processes(&self) -> Result<Vec<ProcessInfo>, CollectError> {
        self.processes.clone()
    }
    async fn boot_time(&self) -> Result<DateTime<Local>, CollectError> {
        self.boot_time.clone()
    }
    async fn net_connections(&self) -> Result<Vec<Connection>, CollectError> {
        self.connections.clone()
    }
    async fn sensors_temperatures(&self) -> Result<Vec<Temperature>, CollectError> {
        self.temperatures.clone()
    }
    async fn battery(&self) -> Result<BatteryInfo, CollectError> {
        self.battery.clone()
    }
    async fn users_current(&self) -> Result<Vec<LoggedInUser>, CollectError> {
        self.users.clone()
    }
    async fn services(&self) -> Result<Vec<ServiceInfo>, CollectError> {
        self.services.clone()
    }
    async fn wifi_profiles(&self) -> Result<Vec<String>, CollectError> {
        self.wifi.clone()
    }
    async fn wifi_profile_detail(&self, name: &str) -> Result<WifiProfile, CollectError> {
        self.wifi_details
            .get(name)
            .cloned()
            .ok_or_else(|| CollectError::NotFound(format!("profile {name}")))
    }
    async fn firmware(&self) -> Result<FirmwareInfo, CollectError> {
        self.firmware.clone()
    }
    async fn gpus(&self) -> Result<Vec<GpuInfo>, CollectError> {
        self.gpus.clone()
    }
    async fn local_accounts(&self) -> Result<Vec<LocalAccount>, CollectError> {
        self.accounts.clone()
    }
    async fn installed_software(&self) -> Result<Vec<SoftwareItem>, CollectError> {
        self.software.clone()
    }
    async fn drivers(&self) -> Result<Vec<DriverInfo>, CollectError> {
        self.drivers.clone()
    }
    async fn security_status(&self) -> Result<SecurityStatus, CollectError> {
        self.security.clone()
    }
    async fn recent_logins(&self) -> Result<Vec<LoginRecord>, CollectError> {
        self.logins.clone()
    }
    async fn events(&self, limit: usize) -> Result<Vec<EventRecord>, CollectError> {
        self.events
            .clone()
            .map(|e| e.into_iter().take(limit).collect())
    }
    async fn power_plan(&self) -> Result<String, CollectError> {
        self.power_plan.clone()
    }
    async fn timezone(&self) -> Result<String, CollectError> {
        self.timezone.clone()
    }
    async fn environment(&self) -> Result<Vec<(String, String)>, CollectError> {
        self.environment.clone()
    }
}

pub fn fixture_spec(id: &'static str, title: &'static str) -> CollectorSpec {
    CollectorSpec {
        id,
        title,
        kind: SectionKind::Table,
        columns: &["Value"],
        weight: 10,
        timeout: None,
        platforms: ANY,
        depends_on: &[],
    }
}

/// Returns one row immediately.
pub struct FixedCollector(pub CollectorSpec);

#[async_trait]
impl Collector for FixedCollector {
    fn spec(&self) -> &CollectorSpec {
        &self.0
    }
    async fn collect(&self, _ctx: &CollectContext) -> Result<Section, CollectError> {
        let mut section = self.0.section();
        section.push_row([self.0.id]);
        Ok(section)
    }
}

/// Sleeps for the given time before returning a row.
pub struct SleepingCollector(pub CollectorSpec, pub Duration);

#[async_trait]
impl Collector for SleepingCollector {
    fn spec(&self) -> &CollectorSpec {
        &self.0
    }
    async fn collect(&self, _ctx: &CollectContext) -> Result<Section, CollectError> {
        tokio::time::sleep(self.1).await;
        let mut section = self.0.section();
        section.push_row(["late"]);
        Ok(section)
    }
}

pub struct PanickingCollector(pub CollectorSpec);

#[async_trait]
impl Collector for PanickingCollector {
    fn spec(&self) -> &CollectorSpec {
        &self.0
    }
    async fn collect(&self, _ctx: &CollectContext) -> Result<Section, CollectError> {
        panic!("collector {} blew up", self.0.id);
    }
}
