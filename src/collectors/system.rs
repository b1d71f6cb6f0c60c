use super::format::{fmt_bytes, fmt_gb, fmt_pct, fmt_uptime, or_na, yes_no};
use super::{optional, CollectContext, Collector, CollectorSpec, ANY};
use crate::error::CollectError;
use crate::probe::{BatteryInfo, BatteryTime, FirmwareInfo};
use crate::report::{Section, SectionKind};
use async_trait::async_trait;
use chrono::Local;

/// Placeholder the orchestrator replaces once the score is known.
pub const HEALTH_SCORE_KEY: &str = "Health Score";

fn battery_time(b: &BatteryInfo) -> String {
    match b.time_left {
        BatteryTime::Seconds(secs) => fmt_uptime(secs),
        BatteryTime::Unlimited => "Unlimited (on AC power)".to_string(),
        BatteryTime::Unknown => "Unknown".to_string(),
    }
}

pub struct Overview;

const OVERVIEW: CollectorSpec = CollectorSpec {
    id: "overview",
    title: "System Overview",
    kind: SectionKind::KeyValue,
    columns: &[],
    weight: 10,
    timeout: None,
    platforms: ANY,
    depends_on: &[],
};

#[async_trait]
impl Collector for Overview {
    fn spec(&self) -> &CollectorSpec {
        &OVERVIEW
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let host = ctx.probe.host_info().await?;
        let memory = ctx.probe.memory().await?;
        let mut s = OVERVIEW.section();
        let cpu = optional(&mut s, "cpu", ctx.probe.cpu().await)?;
        let boot = optional(&mut s, "boot time", ctx.probe.boot_time().await)?;

        s.push_kv("Hostname", host.hostname);
        s.push_kv("Platform", host.platform);
        s.push_kv("Kernel", or_na(host.kernel));
        s.push_kv("Architecture", host.architecture);
        s.push_kv("Machine Type", host.machine_type);
        s.push_kv("Bits", format!("{}-bit", host.bits));
        s.push_kv("Runtime", host.runtime_version);
        match cpu {
            Some(cpu) => {
                s.push_kv("Processor", cpu.brand);
                s.push_kv("Physical Cores", or_na(cpu.physical_cores));
                s.push_kv("Logical Cores", cpu.logical_cores.to_string());
            }
            None => s.push_kv("Processor", "N/A"),
        }
        s.push_kv("Total RAM", fmt_gb(memory.total));
        s.push_kv("Available RAM", fmt_gb(memory.available));
        s.push_kv("Memory Usage", fmt_pct(memory.percent));
        if let Some(boot) = boot {
            let secs = (Local::now() - boot).num_seconds().max(0) as u64;
            s.push_kv("Boot Time", boot.format("%Y-%m-%d %H:%M:%S").to_string());
            s.push_kv("Uptime", fmt_uptime(secs));
        }
        s.push_kv(HEALTH_SCORE_KEY, "Pending");
        Ok(s)
    }
}

pub struct Hardware;

const HARDWARE: CollectorSpec = CollectorSpec {
    id: "hardware",
    title: "Hardware Details",
    kind: SectionKind::Table,
    columns: &["Component", "Property", "Value"],
    weight: 8,
    timeout: None,
    platforms: ANY,
    depends_on: &["dmidecode", "system_profiler", "powershell"],
};

fn push_firmware(s: &mut Section, fw: &FirmwareInfo) {
    let rows = [
        ("BIOS", "Vendor", &fw.bios_vendor),
        ("BIOS", "Version", &fw.bios_version),
        ("BIOS", "Release Date", &fw.bios_date),
        ("Motherboard", "Manufacturer", &fw.board_vendor),
        ("Motherboard", "Model", &fw.board_model),
        ("System", "Manufacturer", &fw.system_vendor),
        ("System", "Product", &fw.system_product),
        ("System", "UUID", &fw.uuid),
        ("System", "Serial Number", &fw.serial),
    ];
    for (component, property, value) in rows {
        s.push_row([component, property, &or_na(value.as_deref())]);
    }
}

#[async_trait]
impl Collector for Hardware {
    fn spec(&self) -> &CollectorSpec {
        &HARDWARE
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let mut s = HARDWARE.section();
        let cpu = optional(&mut s, "cpu", ctx.probe.cpu().await)?;
        let memory = optional(&mut s, "memory", ctx.probe.memory().await)?;
        let firmware = optional(&mut s, "firmware", ctx.probe.firmware().await)?;
        let battery = optional(&mut s, "battery", ctx.probe.battery().await)?;

        if cpu.is_none() && memory.is_none() && firmware.is_none() {
            return Err(CollectError::Unsupported(
                "no processor, memory or firmware details available".to_string(),
            ));
        }
        if let Some(cpu) = cpu {
            s.push_row(["Processor", "Model", &cpu.brand]);
            s.push_row(["Processor", "Physical Cores", &or_na(cpu.physical_cores)]);
            s.push_row(["Processor", "Logical Cores", &cpu.logical_cores.to_string()]);
            s.push_row(["Processor", "Current Speed", &format!("{} MHz", cpu.current_mhz)]);
            s.push_row([
                "Processor",
                "Max Speed",
                &or_na(cpu.max_mhz.map(|m| format!("{m} MHz"))),
            ]);
        }
        if let Some(memory) = memory {
            s.push_row(["Memory", "Total", &fmt_bytes(memory.total)]);
            s.push_row(["Memory", "Swap Total", &fmt_bytes(memory.swap_total)]);
        }
        if let Some(fw) = firmware {
            push_firmware(&mut s, &fw);
        }
        match battery {
            Some(b) => {
                s.push_row(["Battery", "Charge", &fmt_pct(b.percent)]);
                s.push_row(["Battery", "Plugged In", yes_no(b.plugged)]);
                s.push_row(["Battery", "Time Left", &battery_time(&b)]);
            }
            None => s.push_row(["Battery", "Status", "Not present"]),
        }
        Ok(s)
    }
}

pub struct Power;

const POWER: CollectorSpec = CollectorSpec {
    id: "power",
    title: "Power",
    kind: SectionKind::KeyValue,
    columns: &[],
    weight: 3,
    timeout: None,
    platforms: ANY,
    depends_on: &["pmset", "powercfg"],
};

#[async_trait]
impl Collector for Power {
    fn spec(&self) -> &CollectorSpec {
        &POWER
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let mut s = POWER.section();
        let battery = optional(&mut s, "battery", ctx.probe.battery().await)?;
        let plan = optional(&mut s, "power plan", ctx.probe.power_plan().await)?;
        if battery.is_none() && plan.is_none() && s.rows.is_empty() && s.message.is_none() {
            return Err(CollectError::unsupported(
                "no battery or power plan information on this host",
            ));
        }

        match battery {
            Some(b) => {
                s.push_kv("Battery Present", "Yes");
                s.push_kv("Battery Charge", fmt_pct(b.percent));
                s.push_kv("Power Source", if b.plugged { "AC" } else { "Battery" });
                s.push_kv("Time Remaining", battery_time(&b));
            }
            None => {
                s.push_kv("Battery Present", "No");
                s.push_kv("Power Source", "AC");
            }
        }
        s.push_kv("Power Plan", or_na(plan));
        Ok(s)
    }
}

pub struct Uptime;

const UPTIME: CollectorSpec = CollectorSpec {
    id: "uptime",
    title: "Uptime Analysis",
    kind: SectionKind::KeyValue,
    columns: &[],
    weight: 2,
    timeout: None,
    platforms: ANY,
    depends_on: &["tzutil"],
};

#[async_trait]
impl Collector for Uptime {
    fn spec(&self) -> &CollectorSpec {
        &UPTIME
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let boot = ctx.probe.boot_time().await?;
        let mut s = UPTIME.section();
        let tz = optional(&mut s, "timezone", ctx.probe.timezone().await)?;

        let now = Local::now();
        let secs = (now - boot).num_seconds().max(0) as u64;
        s.push_kv("Boot Time", boot.format("%Y-%m-%d %H:%M:%S").to_string());
        s.push_kv("Uptime", fmt_uptime(secs));
        s.push_kv("Days", (secs / 86400).to_string());
        s.push_kv("Hours", format!("{:.1}", secs as f64 / 3600.0));
        s.push_kv("Timezone", tz.unwrap_or_else(|| "Unknown".to_string()));
        s.push_kv("UTC Offset", now.format("%:z").to_string());
        Ok(s)
    }
}

/// Environment variable names containing any of these (case-insensitive)
/// are never reported.
pub const ENV_DENY_LIST: &[&str] = &["password", "secret", "key", "token", "credential"];

pub fn is_sensitive_env(name: &str) -> bool {
    let lower = name.to_lowercase();
    ENV_DENY_LIST.iter().any(|deny| lower.contains(deny))
}

pub struct Environment;

const ENVIRONMENT: CollectorSpec = CollectorSpec {
    id: "env",
    title: "Environment",
    kind: SectionKind::Table,
    columns: &["Variable", "Value"],
    weight: 2,
    timeout: None,
    platforms: ANY,
    depends_on: &[],
};

#[async_trait]
impl Collector for Environment {
    fn spec(&self) -> &CollectorSpec {
        &ENVIRONMENT
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let mut vars = ctx.probe.environment().await?;
        vars.retain(|(k, _)| !is_sensitive_env(k));
        vars.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));

        let mut s = ENVIRONMENT.section();
        for (k, v) in vars {
            s.push_row([k, v]);
        }
        Ok(s)
    }
}

const HYPERVISORS: &[(&str, &str)] = &[
    ("vmware", "VMware"),
    ("virtualbox", "VirtualBox"),
    ("kvm", "KVM"),
    ("qemu", "QEMU"),
    ("hyper-v", "Hyper-V"),
    ("virtual machine", "Hyper-V"),
    ("xen", "Xen"),
    ("parallels", "Parallels"),
    ("bochs", "Bochs"),
];

/// Guesses the hypervisor from firmware vendor and product strings.
pub fn detect_virtualization(fw: &FirmwareInfo) -> Option<&'static str> {
    let haystack = [&fw.system_vendor, &fw.system_product, &fw.bios_vendor, &fw.board_vendor]
        .iter()
        .filter_map(|v| v.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    HYPERVISORS
        .iter()
        .find(|(needle, _)| haystack.contains(needle))
        .map(|(_, name)| *name)
}

pub struct Advanced;

const ADVANCED: CollectorSpec = CollectorSpec {
    id: "advanced",
    title: "Advanced Details",
    kind: SectionKind::Table,
    columns: &["Category", "Property", "Value"],
    weight: 4,
    timeout: None,
    platforms: ANY,
    depends_on: &[],
};

#[async_trait]
impl Collector for Advanced {
    fn spec(&self) -> &CollectorSpec {
        &ADVANCED
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let host = ctx.probe.host_info().await?;
        let mut s = ADVANCED.section();
        let firmware = optional(&mut s, "firmware", ctx.probe.firmware().await)?;
        let processes = optional(&mut s, "processes", ctx.probe.processes().await)?;
        let users = optional(&mut s, "sessions", ctx.probe.users_current().await)?;
        let sensors = optional(&mut s, "sensors", ctx.probe.sensors_temperatures().await)?;

        s.push_row(["Platform", "Kernel", &or_na(host.kernel.as_deref())]);
        s.push_row(["Platform", "Architecture", &host.architecture]);
        s.push_row(["Platform", "Pointer Width", &format!("{}-bit", host.bits)]);
        let virt = match &firmware {
            Some(fw) => detect_virtualization(fw)
                .map(|h| format!("Virtual machine ({h})"))
                .unwrap_or_else(|| "Physical or undetected".to_string()),
            None => "Unknown".to_string(),
        };
        s.push_row(["Virtualization", "Hypervisor", &virt]);
        if let Some(fw) = &firmware {
            s.push_row(["Firmware", "BIOS Version", &or_na(fw.bios_version.as_deref())]);
            s.push_row(["Firmware", "System UUID", &or_na(fw.uuid.as_deref())]);
        }
        s.push_row([
            "Runtime",
            "Process Count",
            &or_na(processes.as_ref().map(Vec::len)),
        ]);
        s.push_row(["Runtime", "Active Sessions", &or_na(users.as_ref().map(Vec::len))]);
        s.push_row([
            "Sensors",
            "Temperature Sensors",
            &sensors.as_ref().map(Vec::len).unwrap_or(0).to_string(),
        ]);
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::report::SectionStatus;
    use crate::runner::Os;
    use crate::test_support::MockProbe;
    use std::sync::Arc;

    fn ctx(probe: MockProbe) -> CollectContext {
        CollectContext {
            probe: Arc::new(probe),
            cancel: CancelToken::never(),
            events_limit: 50,
        }
    }

    #[tokio::test]
    async fn overview_reports_ram_in_gigabytes() {
        let s = Overview.collect(&ctx(MockProbe::new(Os::Linux))).await.expect("section");
        assert_eq!(s.value("Total RAM"), Some("16.00 GB"));
        assert_eq!(s.value("Hostname"), Some("testbox"));
        assert_eq!(s.value(HEALTH_SCORE_KEY), Some("Pending"));
        assert_eq!(s.status, SectionStatus::Ok);
    }

    #[tokio::test]
    async fn environment_drops_sensitive_names() {
        let s = Environment.collect(&ctx(MockProbe::new(Os::Linux))).await.expect("section");
        let names = s.column("Variable");
        assert!(names.contains(&"PATH"));
        assert!(!names.contains(&"DB_PASSWORD"));
        assert!(!names.contains(&"API_TOKEN"));
        for name in names {
            assert!(!is_sensitive_env(name));
        }
        assert!(is_sensitive_env("ssh_auth_KEY_path"));
        assert!(is_sensitive_env("AWS_Credential_File"));
    }

    #[tokio::test]
    async fn hardware_without_battery_still_ok() {
        let s = Hardware.collect(&ctx(MockProbe::new(Os::Linux))).await.expect("section");
        assert_eq!(s.status, SectionStatus::Ok);
        assert!(s.column("Value").contains(&"Not present"));
        assert!(s.column("Value").contains(&"4c4c4544-0042"));
    }

    #[tokio::test]
    async fn broken_firmware_lookup_marks_hardware_partial() {
        let mut probe = MockProbe::new(Os::Linux);
        probe.firmware = Err(CollectError::PermissionDenied("/sys/class/dmi/id/product_uuid".into()));
        let s = Hardware.collect(&ctx(probe)).await.expect("section");
        assert_eq!(s.status, SectionStatus::PartialError);
        assert!(!s.rows.is_empty());
    }

    #[tokio::test]
    async fn uptime_and_power() {
        let s = Uptime.collect(&ctx(MockProbe::new(Os::Linux))).await.expect("section");
        assert_eq!(s.value("Boot Time"), Some("2024-01-15 08:00:00"));
        assert_eq!(s.value("Timezone"), Some("UTC"));

        let s = Power.collect(&ctx(MockProbe::new(Os::Linux))).await.expect("section");
        assert_eq!(s.value("Battery Present"), Some("No"));
        assert_eq!(s.value("Power Plan"), Some("balanced"));

        let mut bare = MockProbe::new(Os::Linux);
        bare.power_plan = Err(CollectError::unsupported("none"));
        let err = Power.collect(&ctx(bare)).await.unwrap_err();
        assert!(matches!(err, CollectError::Unsupported(_)));
    }

    #[test]
    fn virtualization_from_firmware_strings() {
        let fw = FirmwareInfo {
            system_vendor: Some("QEMU".into()),
            ..FirmwareInfo::default()
        };
        assert_eq!(detect_virtualization(&fw), Some("QEMU"));
        let hv = FirmwareInfo {
            system_product: Some("Virtual Machine".into()),
            system_vendor: Some("Microsoft Corporation".into()),
            ..FirmwareInfo::default()
        };
        assert_eq!(detect_virtualization(&hv), Some("Hyper-V"));
        assert_eq!(detect_virtualization(&FirmwareInfo::default()), None);
    }
}
