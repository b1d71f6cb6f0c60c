use super::format::{fmt_bytes, fmt_gb, fmt_pct, or_na};
use super::{optional, CollectContext, Collector, CollectorSpec, ANY};
use crate::error::CollectError;
use crate::probe::{DiskIo, ProcessInfo};
use crate::report::{Section, SectionKind};
use async_trait::async_trait;
use chrono::{Local, TimeZone};
use std::cmp::Ordering;

pub const STORAGE_USAGE_COLUMN: &str = "Usage %";
pub const PROCESS_CPU_COLUMN: &str = "CPU %";
pub const PROCESS_STATUS_COLUMN: &str = "Status";
pub const CPU_CARD: &str = "CPU Usage";
pub const MEMORY_CARD: &str = "Memory Usage";
pub const TEMPERATURE_CARD: &str = "Max Temperature";

pub struct Storage;

const STORAGE: CollectorSpec = CollectorSpec {
    id: "storage",
    title: "Storage Analysis",
    kind: SectionKind::Table,
    columns: &[
        "Device",
        "Mount",
        "File System",
        "Total",
        "Used",
        "Free",
        STORAGE_USAGE_COLUMN,
        "Read",
        "Written",
    ],
    weight: 6,
    timeout: None,
    platforms: ANY,
    depends_on: &[],
};

#[async_trait]
impl Collector for Storage {
    fn spec(&self) -> &CollectorSpec {
        &STORAGE
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let disks = ctx.probe.disks().await?;
        let mut s = STORAGE.section();
        for d in disks {
            s.push_row([
                d.device,
                d.mountpoint,
                d.fstype,
                fmt_bytes(d.total),
                fmt_bytes(d.used),
                fmt_bytes(d.free),
                fmt_pct(d.percent),
                or_na(d.io.map(|io| fmt_bytes(io.read_bytes))),
                or_na(d.io.map(|io| fmt_bytes(io.write_bytes))),
            ]);
        }
        Ok(s)
    }
}

pub struct Gpu;

const GPU: CollectorSpec = CollectorSpec {
    id: "gpu",
    title: "Graphics",
    kind: SectionKind::Table,
    columns: &["Name", "Adapter RAM", "Driver", "Processor"],
    weight: 4,
    timeout: None,
    platforms: ANY,
    depends_on: &["nvidia-smi", "lspci", "system_profiler", "powershell"],
};

#[async_trait]
impl Collector for Gpu {
    fn spec(&self) -> &CollectorSpec {
        &GPU
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let gpus = ctx.probe.gpus().await?;
        let mut s = GPU.section();
        for g in gpus {
            s.push_row([
                g.name,
                or_na(g.adapter_ram_bytes.map(fmt_gb)),
                or_na(g.driver_version),
                or_na(g.processor),
            ]);
        }
        Ok(s)
    }
}

pub struct Performance;

const PERFORMANCE: CollectorSpec = CollectorSpec {
    id: "performance",
    title: "Performance",
    kind: SectionKind::Cards,
    columns: &[],
    weight: 8,
    timeout: None,
    platforms: ANY,
    depends_on: &[],
};

#[async_trait]
impl Collector for Performance {
    fn spec(&self) -> &CollectorSpec {
        &PERFORMANCE
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let cpu = ctx.probe.cpu().await?;
        let memory = ctx.probe.memory().await?;
        let mut s = PERFORMANCE.section();
        let disks = optional(&mut s, "disks", ctx.probe.disks().await)?;
        let ifaces = optional(&mut s, "network", ctx.probe.net_ifaces().await)?;
        let temps = optional(&mut s, "sensors", ctx.probe.sensors_temperatures().await)?;

        let busiest = cpu
            .per_core_percent
            .iter()
            .copied()
            .fold(0.0_f64, f64::max);
        s.push_card(
            CPU_CARD,
            fmt_pct(cpu.overall_percent),
            format!(
                "{} logical cores at {} MHz, busiest core {}",
                cpu.logical_cores,
                cpu.current_mhz,
                fmt_pct(busiest)
            ),
        );
        s.push_card(
            MEMORY_CARD,
            fmt_pct(memory.percent),
            format!("{} of {} used", fmt_bytes(memory.used), fmt_bytes(memory.total)),
        );
        s.push_card(
            "Swap Usage",
            fmt_pct(memory.swap_percent),
            format!(
                "{} of {} used",
                fmt_bytes(memory.swap_used),
                fmt_bytes(memory.swap_total)
            ),
        );

        match disks {
            Some(disks) => {
                let io = disks.iter().filter_map(|d| d.io).fold(DiskIo::default(), |acc, io| {
                    DiskIo {
                        read_bytes: acc.read_bytes + io.read_bytes,
                        write_bytes: acc.write_bytes + io.write_bytes,
                        read_ops: acc.read_ops + io.read_ops,
                        write_ops: acc.write_ops + io.write_ops,
                    }
                });
                s.push_card(
                    "Disk I/O",
                    format!("R {} / W {}", fmt_bytes(io.read_bytes), fmt_bytes(io.write_bytes)),
                    format!("{} reads, {} writes since boot", io.read_ops, io.write_ops),
                );
            }
            None => s.push_card("Disk I/O", "N/A", "disk counters unavailable"),
        }
        match ifaces {
            Some(ifaces) => {
                let recv: u64 = ifaces.iter().map(|i| i.bytes_recv).sum();
                let sent: u64 = ifaces.iter().map(|i| i.bytes_sent).sum();
                let up = ifaces.iter().filter(|i| i.up).count();
                s.push_card(
                    "Network I/O",
                    format!("In {} / Out {}", fmt_bytes(recv), fmt_bytes(sent)),
                    format!("{up} of {} interfaces up", ifaces.len()),
                );
            }
            None => s.push_card("Network I/O", "N/A", "interface counters unavailable"),
        }
        if let Some(hottest) = temps.as_ref().and_then(|t| {
            t.iter()
                .max_by(|a, b| a.current_c.partial_cmp(&b.current_c).unwrap_or(Ordering::Equal))
        }) {
            s.push_card(
                TEMPERATURE_CARD,
                format!("{:.1} °C", hottest.current_c),
                hottest.label.clone(),
            );
        }
        Ok(s)
    }
}

/// CPU% descending, PID ascending on ties. NaN counts as zero.
pub fn sort_processes(procs: &mut [ProcessInfo]) {
    let cpu = |p: &ProcessInfo| {
        if p.cpu_percent.is_nan() {
            0.0
        } else {
            p.cpu_percent
        }
    };
    procs.sort_by(|a, b| {
        cpu(b)
            .partial_cmp(&cpu(a))
            .unwrap_or(Ordering::Equal)
            .then(a.pid.cmp(&b.pid))
    });
}

pub struct Processes;

const PROCESSES: CollectorSpec = CollectorSpec {
    id: "processes",
    title: "Task Manager",
    kind: SectionKind::Table,
    columns: &[
        "PID",
        "PPID",
        "Name",
        "User",
        PROCESS_CPU_COLUMN,
        "Memory %",
        "RSS",
        "VMS",
        "Threads",
        PROCESS_STATUS_COLUMN,
        "Nice",
        "Started",
        "Executable",
        "Command Line",
    ],
    weight: 10,
    timeout: None,
    platforms: ANY,
    depends_on: &[],
};

#[async_trait]
impl Collector for Processes {
    fn spec(&self) -> &CollectorSpec {
        &PROCESSES
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let mut procs = ctx.probe.processes().await?;
        sort_processes(&mut procs);

        let mut s = PROCESSES.section();
        for p in procs {
            let started = Local
                .timestamp_opt(p.create_time as i64, 0)
                .single()
                .filter(|_| p.create_time > 0)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string());
            s.push_row([
                p.pid.to_string(),
                or_na(p.ppid),
                p.name,
                or_na(Some(p.user)),
                fmt_pct(p.cpu_percent),
                fmt_pct(p.mem_percent),
                fmt_bytes(p.rss),
                fmt_bytes(p.vms),
                or_na(p.num_threads),
                p.status,
                or_na(p.nice),
                or_na(started),
                or_na(Some(p.exe_path)),
                p.cmdline,
            ]);
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::probe::Temperature;
    use crate::report::SectionStatus;
    use crate::runner::Os;
    use crate::test_support::{disk, process, MockProbe};
    use std::sync::Arc;

    fn ctx(probe: MockProbe) -> CollectContext {
        CollectContext {
            probe: Arc::new(probe),
            cancel: CancelToken::never(),
            events_limit: 50,
        }
    }

    #[test]
    fn processes_sort_by_cpu_then_pid() {
        let mut procs = vec![
            process(30, "c", 5.0, "Sleeping"),
            process(10, "a", 5.0, "Sleeping"),
            process(20, "b", f64::NAN, "Sleeping"),
            process(5, "d", 80.0, "Runnable"),
        ];
        sort_processes(&mut procs);
        let pids: Vec<u32> = procs.iter().map(|p| p.pid).collect();
        assert_eq!(pids, [5, 10, 30, 20]);
    }

    #[tokio::test]
    async fn task_manager_lists_every_process() {
        let mut probe = MockProbe::new(Os::Linux);
        probe.processes = Ok((1..=300).map(|pid| process(pid, "w", (pid % 7) as f64, "Sleeping")).collect());
        let s = Processes.collect(&ctx(probe)).await.expect("section");
        assert_eq!(s.rows.len(), 300);
        assert_eq!(s.column("PID")[0], "6");
        assert_eq!(s.column(PROCESS_CPU_COLUMN)[0], "6.0%");
    }

    #[tokio::test]
    async fn storage_rows_carry_usage() {
        let mut probe = MockProbe::new(Os::Linux);
        probe.disks = Ok(vec![disk("/", 12.0), disk("/data", 96.4)]);
        let s = Storage.collect(&ctx(probe)).await.expect("section");
        assert_eq!(s.column(STORAGE_USAGE_COLUMN), ["12.0%", "96.4%"]);
        assert_eq!(s.column("Read")[0], "1.00 MB");
    }

    #[tokio::test]
    async fn performance_cards() {
        let mut probe = MockProbe::new(Os::Linux);
        probe.temperatures = Ok(vec![
            Temperature {
                label: "Package id 0".into(),
                current_c: 61.0,
                high_c: Some(80.0),
                critical_c: Some(100.0),
            },
            Temperature {
                label: "acpitz".into(),
                current_c: 44.5,
                high_c: None,
                critical_c: None,
            },
        ]);
        let s = Performance.collect(&ctx(probe)).await.expect("section");
        assert_eq!(s.card(CPU_CARD), Some("10.0%"));
        assert_eq!(s.card(MEMORY_CARD), Some("40.0%"));
        assert_eq!(s.card(TEMPERATURE_CARD), Some("61.0 °C"));
        assert_eq!(s.card("Disk I/O"), Some("R 1.00 MB / W 2.00 MB"));

        let s = Performance
            .collect(&ctx(MockProbe::new(Os::Linux)))
            .await
            .expect("section");
        assert_eq!(s.card(TEMPERATURE_CARD), None);
        assert_eq!(s.status, SectionStatus::Ok);
    }

    #[tokio::test]
    async fn gpu_ram_in_gigabytes() {
        let mut probe = MockProbe::new(Os::Windows);
        probe.gpus = Ok(vec![crate::probe::GpuInfo {
            name: "Intel(R) UHD Graphics".into(),
            adapter_ram_bytes: Some(1_073_741_824),
            driver_version: None,
            processor: Some("Intel(R) UHD Graphics Family".into()),
        }]);
        let s = Gpu.collect(&ctx(probe)).await.expect("section");
        assert_eq!(s.column("Adapter RAM"), ["1.00 GB"]);
        assert_eq!(s.column("Driver"), ["N/A"]);
    }
}
