use super::{
    linux, macos, windows, BatteryInfo, Connection, CpuInfo, DiskInfo, DriverInfo, EventRecord,
    FirmwareInfo, GpuInfo, HostRecord, LocalAccount, LoggedInUser, LoginRecord, MemoryInfo,
    NetInterface, PlatformProbe, ProcessInfo, SecurityStatus, ServiceInfo, SoftwareItem,
    Temperature, WifiProfile,
};
use crate::error::CollectError;
use crate::executor::CommandExecutor;
use crate::runner::{CommandLine, Os};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{
    ComponentExt, CpuExt, DiskExt, NetworkExt, NetworksExt, PidExt, ProcessExt, System,
    SystemExt, UserExt,
};
use tokio::sync::Mutex;
use tracing::debug;

/// Window between the two refreshes that CPU percentages are computed over.
const CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(500);

/// Probe backed by `sysinfo` plus OS commands run through the executor.
pub struct NativeProbe {
    os: Os,
    exec: Arc<CommandExecutor>,
    system: Mutex<System>,
}

impl NativeProbe {
    pub fn new(os: Os, exec: Arc<CommandExecutor>) -> Self {
        Self {
            os,
            exec,
            system: Mutex::new(System::new()),
        }
    }

    async fn sample_window(&self) -> Result<(), CollectError> {
        let cancel = self.exec.cancel_token();
        tokio::select! {
            _ = tokio::time::sleep(CPU_SAMPLE_WINDOW) => Ok(()),
            _ = cancel.canceled() => Err(CollectError::Canceled),
        }
    }

    fn unsupported<T>(&self, what: &str) -> Result<T, CollectError> {
        Err(CollectError::unsupported(format!("{what} is not available on {}", self.os)))
    }

    async fn machine_type(&self) -> String {
        let fallback = std::env::consts::ARCH.to_string();
        match self.os {
            Os::Windows => std::env::var("PROCESSOR_ARCHITECTURE").unwrap_or(fallback),
            Os::Linux | Os::MacOs => self
                .exec
                .run(&CommandLine::new("uname").arg("-m"))
                .await
                .ok()
                .and_then(|v| super::non_empty(&v))
                .unwrap_or(fallback),
        }
    }

    /// Fills traffic counters from sysinfo for interfaces whose platform
    /// lookup left them at zero.
    fn merge_counters(system: &System, ifaces: &mut [NetInterface]) {
        for (name, data) in system.networks().iter() {
            let Some(iface) = ifaces.iter_mut().find(|i| &i.name == name) else {
                continue;
            };
            if iface.bytes_recv == 0 && iface.bytes_sent == 0 {
                iface.bytes_recv = data.total_received();
                iface.bytes_sent = data.total_transmitted();
                iface.packets_recv = data.total_packets_received();
                iface.packets_sent = data.total_packets_transmitted();
                iface.errin = data.total_errors_on_received();
                iface.errout = data.total_errors_on_transmitted();
            }
        }
    }

    fn sysinfo_ifaces(system: &System) -> Vec<NetInterface> {
        let mut out: Vec<NetInterface> = system
            .networks()
            .iter()
            .map(|(name, data)| NetInterface {
                name: name.clone(),
                up: data.total_received() > 0 || data.total_transmitted() > 0,
                bytes_recv: data.total_received(),
                bytes_sent: data.total_transmitted(),
                packets_recv: data.total_packets_received(),
                packets_sent: data.total_packets_transmitted(),
                errin: data.total_errors_on_received(),
                errout: data.total_errors_on_transmitted(),
                ..NetInterface::default()
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[async_trait]
impl PlatformProbe for NativeProbe {
    fn os(&self) -> Os {
        self.os
    }

    async fn host_info(&self) -> Result<HostRecord, CollectError> {
        let (name, version, kernel) = {
            let system = self.system.lock().await;
            (system.host_name(), system.os_version(), system.kernel_version())
        };
        let hostname = match name.and_then(|h| super::non_empty(&h)) {
            Some(h) => h,
            None => hostname::get()
                .map_err(|err| CollectError::from_io("hostname", err))?
                .to_string_lossy()
                .into_owned(),
        };
        if hostname.trim().is_empty() {
            return Err(CollectError::NotFound("hostname".to_string()));
        }
        let platform = match version {
            Some(v) => format!("{} {v}", self.os),
            None => self.os.to_string(),
        };
        Ok(HostRecord {
            hostname,
            platform,
            kernel,
            architecture: std::env::consts::ARCH.to_string(),
            machine_type: self.machine_type().await,
            bits: usize::BITS,
            runtime_version: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        })
    }

    async fn memory(&self) -> Result<MemoryInfo, CollectError> {
        let mut system = self.system.lock().await;
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return Err(CollectError::malformed("total memory reported as zero"));
        }
        let available = system.available_memory();
        let used = total.saturating_sub(available);
        let swap_total = system.total_swap();
        let swap_used = system.used_swap();
        Ok(MemoryInfo {
            total,
            available,
            used,
            percent: percent(used, total),
            swap_total,
            swap_used,
            swap_percent: percent(swap_used, swap_total),
        })
    }

    async fn cpu(&self) -> Result<CpuInfo, CollectError> {
        let mut system = self.system.lock().await;
        system.refresh_cpu();
        self.sample_window().await?;
        system.refresh_cpu();

        let cpus = system.cpus();
        if cpus.is_empty() {
            return Err(CollectError::malformed("no CPUs reported"));
        }
        let per_core_percent: Vec<f64> = cpus.iter().map(|c| c.cpu_usage() as f64).collect();
        let overall_percent = per_core_percent.iter().sum::<f64>() / per_core_percent.len() as f64;
        let brand = cpus[0].brand().trim().to_string();
        let current_mhz = cpus[0].frequency();
        let logical_cores = cpus.len();
        let physical_cores = system.physical_core_count();
        drop(system);

        let max_mhz = match self.os {
            Os::Linux => linux::max_cpu_mhz().await,
            Os::MacOs => macos::max_cpu_mhz(&self.exec).await,
            Os::Windows => windows::max_cpu_mhz(&self.exec).await,
        };
        Ok(CpuInfo {
            brand,
            physical_cores,
            logical_cores,
            current_mhz,
            max_mhz,
            overall_percent,
            per_core_percent,
        })
    }

    async fn disks(&self) -> Result<Vec<DiskInfo>, CollectError> {
        let mut disks: Vec<DiskInfo> = {
            let mut system = self.system.lock().await;
            system.refresh_disks_list();
            system.refresh_disks();
            system
                .disks()
                .iter()
                .filter_map(|d| {
                    let fstype = String::from_utf8_lossy(d.file_system()).to_string();
                    let mountpoint = d.mount_point().to_string_lossy().to_string();
                    let total = d.total_space();
                    if total == 0 || linux::is_virtual_mount(&fstype, &mountpoint) {
                        return None;
                    }
                    let free = d.available_space();
                    let used = total.saturating_sub(free);
                    Some(DiskInfo {
                        device: d.name().to_string_lossy().to_string(),
                        mountpoint,
                        fstype,
                        total,
                        used,
                        free,
                        percent: percent(used, total),
                        io: None,
                    })
                })
                .collect()
        };

        if self.os == Os::Linux {
            match linux::disk_io().await {
                Ok(io) => {
                    for disk in &mut disks {
                        let dev = disk.device.trim_start_matches("/dev/");
                        disk.io = io.get(dev).copied();
                    }
                }
                Err(err) => debug!(error = %err, "disk I/O counters unavailable"),
            }
        }
        Ok(disks)
    }

    async fn net_ifaces(&self) -> Result<Vec<NetInterface>, CollectError> {
        let lookup = match self.os {
            Os::Linux => linux::net_ifaces(&self.exec).await,
            Os::MacOs => macos::net_ifaces(&self.exec).await,
            Os::Windows => windows::net_ifaces(&self.exec).await,
        };
        let mut system = self.system.lock().await;
        system.refresh_networks_list();
        system.refresh_networks();
        match lookup {
            Ok(mut ifaces) => {
                Self::merge_counters(&system, &mut ifaces);
                Ok(ifaces)
            }
            Err(err @ CollectError::Canceled) => Err(err),
            Err(err) => {
                let fallback = Self::sysinfo_ifaces(&system);
                if fallback.is_empty() {
                    Err(err)
                } else {
                    debug!(error = %err, "interface lookup failed, using counters only");
                    Ok(fallback)
                }
            }
        }
    }

    async fn processes(&self) -> Result<Vec<ProcessInfo>, CollectError> {
        let mut out = {
            let mut system = self.system.lock().await;
            system.refresh_memory();
            system.refresh_users_list();
            system.refresh_processes();
            self.sample_window().await?;
            system.refresh_processes();

            let total_mem = system.total_memory();
            system
                .processes()
                .values()
                .map(|p| {
                    let user = p
                        .user_id()
                        .and_then(|uid| system.get_user_by_id(uid))
                        .map(|u| u.name().to_string())
                        .unwrap_or_default();
                    ProcessInfo {
                        pid: p.pid().as_u32(),
                        ppid: p.parent().map(|pp| pp.as_u32()),
                        name: p.name().to_string(),
                        user,
                        cpu_percent: p.cpu_usage() as f64,
                        mem_percent: percent(p.memory(), total_mem),
                        rss: p.memory(),
                        vms: p.virtual_memory(),
                        num_threads: None,
                        status: p.status().to_string(),
                        nice: None,
                        create_time: p.start_time(),
                        exe_path: p.exe().to_string_lossy().to_string(),
                        cmdline: p.cmd().join(" "),
                    }
                })
                .collect::<Vec<_>>()
        };

        if self.os == Os::Linux {
            for p in &mut out {
                self.exec.cancel_token().check()?;
                if let Some((nice, threads)) = linux::proc_stat(p.pid).await {
                    p.nice = Some(nice);
                    p.num_threads = Some(threads);
                }
            }
        }
        Ok(out)
    }

    async fn boot_time(&self) -> Result<DateTime<Local>, CollectError> {
        let secs = self.system.lock().await.boot_time();
        if secs == 0 {
            return Err(CollectError::malformed("boot time reported as zero"));
        }
        Local
            .timestamp_opt(secs as i64, 0)
            .single()
            .ok_or_else(|| CollectError::malformed(format!("boot time {secs} out of range")))
    }

    async fn net_connections(&self) -> Result<Vec<Connection>, CollectError> {
        match self.os {
            Os::Linux => linux::net_connections(&self.exec).await,
            Os::MacOs => macos::net_connections(&self.exec).await,
            Os::Windows => windows::net_connections(&self.exec).await,
        }
    }

    async fn sensors_temperatures(&self) -> Result<Vec<Temperature>, CollectError> {
        let mut temps: Vec<Temperature> = {
            let mut system = self.system.lock().await;
            system.refresh_components_list();
            system.refresh_components();
            system
                .components()
                .iter()
                .filter(|c| c.temperature().is_finite() && c.temperature() > 0.0)
                .map(|c| Temperature {
                    label: c.label().to_string(),
                    current_c: c.temperature() as f64,
                    high_c: Some(c.max() as f64).filter(|v| *v > 0.0),
                    critical_c: c.critical().map(f64::from),
                })
                .collect()
        };
        if temps.is_empty() {
            temps = match self.os {
                Os::Linux => linux::thermal_zones().await,
                Os::Windows => windows::thermal_zones(&self.exec).await?,
                Os::MacOs => Vec::new(),
            };
        }
        if temps.is_empty() {
            return self.unsupported("temperature sensors");
        }
        Ok(temps)
    }

    async fn battery(&self) -> Result<BatteryInfo, CollectError> {
        match self.os {
            Os::Linux => linux::battery().await,
            Os::MacOs => macos::battery(&self.exec).await,
            Os::Windows => windows::battery(&self.exec).await,
        }
    }

    async fn users_current(&self) -> Result<Vec<LoggedInUser>, CollectError> {
        match self.os {
            Os::Linux | Os::MacOs => linux::users_current(&self.exec).await,
            Os::Windows => windows::users_current(&self.exec).await,
        }
    }

    async fn services(&self) -> Result<Vec<ServiceInfo>, CollectError> {
        match self.os {
            Os::Windows => windows::services(&self.exec).await,
            _ => self.unsupported("Services"),
        }
    }

    async fn wifi_profiles(&self) -> Result<Vec<String>, CollectError> {
        match self.os {
            Os::Windows => windows::wifi_profiles(&self.exec).await,
            _ => self.unsupported("WiFi Profiles"),
        }
    }

    async fn wifi_profile_detail(&self, name: &str) -> Result<WifiProfile, CollectError> {
        match self.os {
            Os::Windows => windows::wifi_profile_detail(&self.exec, name).await,
            _ => self.unsupported("WiFi Profiles"),
        }
    }

    async fn firmware(&self) -> Result<FirmwareInfo, CollectError> {
        match self.os {
            Os::Linux => linux::firmware().await,
            Os::MacOs => macos::firmware(&self.exec).await,
            Os::Windows => windows::firmware(&self.exec).await,
        }
    }

    async fn gpus(&self) -> Result<Vec<GpuInfo>, CollectError> {
        match self.os {
            Os::Linux => linux::gpus(&self.exec).await,
            Os::MacOs => macos::gpus(&self.exec).await,
            Os::Windows => windows::gpus(&self.exec).await,
        }
    }

    async fn local_accounts(&self) -> Result<Vec<LocalAccount>, CollectError> {
        match self.os {
            Os::Linux => linux::local_accounts().await,
            Os::MacOs => macos::local_accounts(&self.exec).await,
            Os::Windows => windows::local_accounts(&self.exec).await,
        }
    }

    async fn installed_software(&self) -> Result<Vec<SoftwareItem>, CollectError> {
        match self.os {
            Os::Linux => linux::installed_software(&self.exec).await,
            Os::MacOs => macos::installed_software(&self.exec).await,
            Os::Windows => windows::installed_software(&self.exec).await,
        }
    }

    async fn drivers(&self) -> Result<Vec<DriverInfo>, CollectError> {
        match self.os {
            Os::Windows => windows::drivers(&self.exec).await,
            _ => self.unsupported("Drivers"),
        }
    }

    async fn security_status(&self) -> Result<SecurityStatus, CollectError> {
        match self.os {
            Os::Linux => linux::security_status(&self.exec).await,
            Os::MacOs => macos::security_status(&self.exec).await,
            Os::Windows => windows::security_status(&self.exec).await,
        }
    }

    async fn recent_logins(&self) -> Result<Vec<LoginRecord>, CollectError> {
        match self.os {
            Os::Linux | Os::MacOs => linux::recent_logins(&self.exec).await,
            Os::Windows => windows::recent_logins(&self.exec).await,
        }
    }

    async fn events(&self, limit: usize) -> Result<Vec<EventRecord>, CollectError> {
        match self.os {
            Os::Windows => windows::events(&self.exec, limit).await,
            _ => self.unsupported("Event Log"),
        }
    }

    async fn power_plan(&self) -> Result<String, CollectError> {
        match self.os {
            Os::Linux => linux::power_plan().await,
            Os::MacOs => macos::power_plan(&self.exec).await,
            Os::Windows => windows::power_plan(&self.exec).await,
        }
    }

    async fn timezone(&self) -> Result<String, CollectError> {
        match self.os {
            Os::Linux | Os::MacOs => linux::timezone(&self.exec).await,
            Os::Windows => windows::timezone(&self.exec).await,
        }
    }
}
