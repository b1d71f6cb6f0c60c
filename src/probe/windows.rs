//! Windows lookups. PowerShell queries emit `ConvertTo-Json -Compress` and are
//! read into typed records; `netsh` output is parsed for English labels only.

use super::{
    non_empty, parse_f64_loose, parse_u64_loose, BatteryInfo, BatteryTime, Connection,
    DriverInfo, EventRecord, FirmwareInfo, GpuInfo, LocalAccount, LoggedInUser, LoginRecord,
    NetInterface, SecurityStatus, ServiceInfo, SoftwareItem, Temperature, WifiProfile,
};
use crate::error::CollectError;
use crate::executor::CommandExecutor;
use crate::runner::CommandLine;
use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::Deserialize;
use serde_json::Value;

const SERVICES_SCRIPT: &str = r#"Get-CimInstance Win32_Service -ErrorAction SilentlyContinue | Select-Object Name,DisplayName,State,StartMode,ProcessId,PathName | ConvertTo-Json -Compress"#;

const DRIVERS_SCRIPT: &str = r#"Get-CimInstance Win32_SystemDriver -ErrorAction SilentlyContinue | Select-Object Name,DisplayName,State,StartMode,PathName | ConvertTo-Json -Compress"#;

const SOFTWARE_SCRIPT: &str = r#"$paths=@('HKLM:\Software\Microsoft\Windows\CurrentVersion\Uninstall\*','HKLM:\Software\Wow6432Node\Microsoft\Windows\CurrentVersion\Uninstall\*','HKCU:\Software\Microsoft\Windows\CurrentVersion\Uninstall\*'); Get-ItemProperty $paths -ErrorAction SilentlyContinue | Where-Object { $_.DisplayName } | Select-Object DisplayName,DisplayVersion,Publisher,InstallDate | ConvertTo-Json -Compress"#;

const FIRMWARE_SCRIPT: &str = r#"$b=Get-CimInstance Win32_BIOS -ErrorAction SilentlyContinue; $m=Get-CimInstance Win32_BaseBoard -ErrorAction SilentlyContinue; $c=Get-CimInstance Win32_ComputerSystemProduct -ErrorAction SilentlyContinue; $d=''; if($b.ReleaseDate){$d=$b.ReleaseDate.ToString('yyyy-MM-dd')}; [pscustomobject]@{BiosVendor=$b.Manufacturer;BiosVersion=$b.SMBIOSBIOSVersion;BiosDate=$d;BoardVendor=$m.Manufacturer;BoardModel=$m.Product;SystemVendor=$c.Vendor;SystemProduct=$c.Name;Uuid=$c.UUID;Serial=$b.SerialNumber} | ConvertTo-Json -Compress"#;

const GPU_SCRIPT: &str = r#"Get-CimInstance Win32_VideoController -ErrorAction SilentlyContinue | Select-Object Name,AdapterRAM,DriverVersion,VideoProcessor | ConvertTo-Json -Compress"#;

const ACCOUNTS_SCRIPT: &str = r#"$admins=@(Get-LocalGroupMember -SID 'S-1-5-32-544' -ErrorAction SilentlyContinue | ForEach-Object { $_.Name.Split('\')[-1] }); Get-LocalUser | Select-Object Name,FullName,@{n='Sid';e={"$($_.SID)"}},Enabled,@{n='IsAdmin';e={$admins -contains $_.Name}} | ConvertTo-Json -Compress"#;

const SECURITY_SCRIPT: &str = r#"$av=@(Get-CimInstance -Namespace root/SecurityCenter2 -ClassName AntiVirusProduct -ErrorAction SilentlyContinue | ForEach-Object { [pscustomobject]@{Name=$_.displayName;State=$_.productState} }); $lua=(Get-ItemProperty 'HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\Policies\System' -ErrorAction SilentlyContinue).EnableLUA; $p=[Security.Principal.WindowsPrincipal][Security.Principal.WindowsIdentity]::GetCurrent(); [pscustomobject]@{Antivirus=$av;EnableLua=$lua;IsAdmin=$p.IsInRole([Security.Principal.WindowsBuiltInRole]::Administrator)} | ConvertTo-Json -Compress -Depth 4"#;

const BATTERY_SCRIPT: &str = r#"Get-CimInstance Win32_Battery -ErrorAction SilentlyContinue | Select-Object -First 1 EstimatedChargeRemaining,BatteryStatus,EstimatedRunTime | ConvertTo-Json -Compress"#;

const NETWORK_SCRIPT: &str = r#"Get-NetAdapter -ErrorAction SilentlyContinue | ForEach-Object { $a=$_; $ip=@(Get-NetIPAddress -InterfaceIndex $a.ifIndex -ErrorAction SilentlyContinue); [pscustomobject]@{Name=$a.Name;Status="$($a.Status)";MtuSize=$a.MtuSize;Speed=$a.Speed;MacAddress=$a.MacAddress;IPv4=@($ip | Where-Object AddressFamily -eq 'IPv4' | ForEach-Object { "$($_.IPAddress)/$($_.PrefixLength)" });IPv6=@($ip | Where-Object AddressFamily -eq 'IPv6' | ForEach-Object { "$($_.IPAddress)/$($_.PrefixLength)" })} } | ConvertTo-Json -Compress -Depth 4"#;

const CONNECTIONS_SCRIPT: &str = r#"Get-NetTCPConnection -ErrorAction SilentlyContinue | Select-Object LocalAddress,LocalPort,RemoteAddress,RemotePort,@{n='State';e={"$($_.State)"}},OwningProcess | ConvertTo-Json -Compress"#;

const THERMAL_SCRIPT: &str = r#"Get-CimInstance -Namespace root/wmi -ClassName MSAcpi_ThermalZoneTemperature -ErrorAction SilentlyContinue | Select-Object InstanceName,CurrentTemperature,CriticalTripPoint | ConvertTo-Json -Compress"#;

const BOOTS_SCRIPT: &str = r#"Get-WinEvent -FilterHashtable @{LogName='System'; Id=6005,6006,6008,1074} -MaxEvents 20 -ErrorAction SilentlyContinue | Select-Object @{n='Time';e={$_.TimeCreated.ToString('s')}},Id | ConvertTo-Json -Compress"#;

const MAX_CLOCK_SCRIPT: &str = "(Get-CimInstance Win32_Processor | Select-Object -First 1).MaxClockSpeed";

const EVENT_MESSAGE_CHARS: usize = 200;

fn events_script(limit: usize) -> String {
    format!(
        r#"Get-WinEvent -LogName System -MaxEvents {limit} -ErrorAction SilentlyContinue | Select-Object @{{n='Time';e={{$_.TimeCreated.ToString('s')}}}},LevelDisplayName,ProviderName,Id,Message | ConvertTo-Json -Compress"#
    )
}

async fn powershell(exec: &CommandExecutor, script: &str) -> Result<String, CollectError> {
    exec.run(&CommandLine::powershell(script)).await
}

/// `ConvertTo-Json` prints a bare object for a single item and nothing at
/// all for an empty pipeline.
fn flatten(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn json_records<T: DeserializeOwned>(what: &str, text: &str) -> Result<Vec<T>, CollectError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(text)
        .map_err(|err| CollectError::malformed(format!("{what} JSON: {err}")))?;
    flatten(value)
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .map_err(|err| CollectError::malformed(format!("{what} record: {err}")))
        })
        .collect()
}

/// WMI hands back strings, numbers, booleans or null for the same property
/// depending on the host; everything is read as trimmed text.
fn lenient<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    })
}

fn one_or_many<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    flatten(Value::deserialize(d)?)
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(D::Error::custom))
        .collect()
}

fn is_true(v: &str) -> bool {
    v.eq_ignore_ascii_case("true")
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinService {
    #[serde(default, deserialize_with = "lenient")]
    name: String,
    #[serde(default, deserialize_with = "lenient")]
    display_name: String,
    #[serde(default, deserialize_with = "lenient")]
    state: String,
    #[serde(default, deserialize_with = "lenient")]
    start_mode: String,
    #[serde(default, deserialize_with = "lenient")]
    process_id: String,
    #[serde(default, deserialize_with = "lenient")]
    path_name: String,
}

pub fn parse_services(text: &str) -> Result<Vec<ServiceInfo>, CollectError> {
    let records: Vec<WinService> = json_records("Win32_Service", text)?;
    Ok(records
        .into_iter()
        .filter(|s| !s.name.is_empty())
        .map(|s| ServiceInfo {
            pid: s.process_id.parse().ok().filter(|p| *p != 0),
            name: s.name,
            display_name: s.display_name,
            status: s.state,
            start_type: s.start_mode,
            binpath: s.path_name,
        })
        .collect())
}

pub async fn services(exec: &CommandExecutor) -> Result<Vec<ServiceInfo>, CollectError> {
    parse_services(&powershell(exec, SERVICES_SCRIPT).await?)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinDriver {
    #[serde(default, deserialize_with = "lenient")]
    name: String,
    #[serde(default, deserialize_with = "lenient")]
    display_name: String,
    #[serde(default, deserialize_with = "lenient")]
    state: String,
    #[serde(default, deserialize_with = "lenient")]
    start_mode: String,
    #[serde(default, deserialize_with = "lenient")]
    path_name: String,
}

pub fn parse_drivers(text: &str) -> Result<Vec<DriverInfo>, CollectError> {
    let records: Vec<WinDriver> = json_records("Win32_SystemDriver", text)?;
    Ok(records
        .into_iter()
        .filter(|d| !d.name.is_empty())
        .map(|d| DriverInfo {
            name: d.name,
            display_name: d.display_name,
            state: d.state,
            start_mode: d.start_mode,
            path: d.path_name,
        })
        .collect())
}

pub async fn drivers(exec: &CommandExecutor) -> Result<Vec<DriverInfo>, CollectError> {
    parse_drivers(&powershell(exec, DRIVERS_SCRIPT).await?)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinProgram {
    #[serde(default, deserialize_with = "lenient")]
    display_name: String,
    #[serde(default, deserialize_with = "lenient")]
    display_version: String,
    #[serde(default, deserialize_with = "lenient")]
    publisher: String,
    #[serde(default, deserialize_with = "lenient")]
    install_date: String,
}

pub fn parse_software(text: &str) -> Result<Vec<SoftwareItem>, CollectError> {
    let records: Vec<WinProgram> = json_records("Uninstall", text)?;
    Ok(records
        .into_iter()
        .filter(|p| !p.display_name.is_empty())
        .map(|p| SoftwareItem {
            name: p.display_name,
            version: p.display_version,
            publisher: p.publisher,
            install_date: p.install_date,
        })
        .collect())
}

pub async fn installed_software(exec: &CommandExecutor) -> Result<Vec<SoftwareItem>, CollectError> {
    parse_software(&powershell(exec, SOFTWARE_SCRIPT).await?)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinFirmware {
    #[serde(default, deserialize_with = "lenient")]
    bios_vendor: String,
    #[serde(default, deserialize_with = "lenient")]
    bios_version: String,
    #[serde(default, deserialize_with = "lenient")]
    bios_date: String,
    #[serde(default, deserialize_with = "lenient")]
    board_vendor: String,
    #[serde(default, deserialize_with = "lenient")]
    board_model: String,
    #[serde(default, deserialize_with = "lenient")]
    system_vendor: String,
    #[serde(default, deserialize_with = "lenient")]
    system_product: String,
    #[serde(default, deserialize_with = "lenient")]
    uuid: String,
    #[serde(default, deserialize_with = "lenient")]
    serial: String,
}

pub fn parse_firmware(text: &str) -> Result<FirmwareInfo, CollectError> {
    let fw = json_records::<WinFirmware>("firmware", text)?
        .into_iter()
        .next()
        .ok_or_else(|| CollectError::malformed("empty firmware query output"))?;
    Ok(FirmwareInfo {
        bios_vendor: non_empty(&fw.bios_vendor),
        bios_version: non_empty(&fw.bios_version),
        bios_date: non_empty(&fw.bios_date),
        board_vendor: non_empty(&fw.board_vendor),
        board_model: non_empty(&fw.board_model),
        system_vendor: non_empty(&fw.system_vendor),
        system_product: non_empty(&fw.system_product),
        uuid: non_empty(&fw.uuid),
        serial: non_empty(&fw.serial),
    })
}

pub async fn firmware(exec: &CommandExecutor) -> Result<FirmwareInfo, CollectError> {
    parse_firmware(&powershell(exec, FIRMWARE_SCRIPT).await?)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinVideoController {
    #[serde(default, deserialize_with = "lenient")]
    name: String,
    #[serde(rename = "AdapterRAM", default, deserialize_with = "lenient")]
    adapter_ram: String,
    #[serde(default, deserialize_with = "lenient")]
    driver_version: String,
    #[serde(default, deserialize_with = "lenient")]
    video_processor: String,
}

pub fn parse_gpus(text: &str) -> Result<Vec<GpuInfo>, CollectError> {
    let records: Vec<WinVideoController> = json_records("Win32_VideoController", text)?;
    Ok(records
        .into_iter()
        .filter(|g| !g.name.is_empty())
        .map(|g| GpuInfo {
            adapter_ram_bytes: parse_u64_loose(&g.adapter_ram).filter(|v| *v > 0),
            driver_version: non_empty(&g.driver_version),
            processor: non_empty(&g.video_processor),
            name: g.name,
        })
        .collect())
}

pub async fn gpus(exec: &CommandExecutor) -> Result<Vec<GpuInfo>, CollectError> {
    parse_gpus(&powershell(exec, GPU_SCRIPT).await?)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinLocalUser {
    #[serde(default, deserialize_with = "lenient")]
    name: String,
    #[serde(default, deserialize_with = "lenient")]
    full_name: String,
    #[serde(default, deserialize_with = "lenient")]
    sid: String,
    #[serde(default, deserialize_with = "lenient")]
    enabled: String,
    #[serde(default, deserialize_with = "lenient")]
    is_admin: String,
}

pub fn parse_accounts(text: &str) -> Result<Vec<LocalAccount>, CollectError> {
    let records: Vec<WinLocalUser> = json_records("Get-LocalUser", text)?;
    Ok(records
        .into_iter()
        .filter(|u| !u.name.is_empty())
        .map(|u| LocalAccount {
            enabled: is_true(&u.enabled),
            is_admin: is_true(&u.is_admin),
            name: u.name,
            full_name: u.full_name,
            uid: u.sid,
            home: String::new(),
            shell: String::new(),
        })
        .collect())
}

pub async fn local_accounts(exec: &CommandExecutor) -> Result<Vec<LocalAccount>, CollectError> {
    parse_accounts(&powershell(exec, ACCOUNTS_SCRIPT).await?)
}

/// SecurityCenter2 packs the product state into a bitfield; bits 12..16
/// equal to 1 mean real-time protection is on.
fn av_enabled(product_state: u64) -> bool {
    (product_state >> 12) & 0xF == 1
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinAntivirus {
    #[serde(default, deserialize_with = "lenient")]
    name: String,
    #[serde(default, deserialize_with = "lenient")]
    state: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinSecurity {
    #[serde(default, deserialize_with = "one_or_many")]
    antivirus: Vec<WinAntivirus>,
    #[serde(default, deserialize_with = "lenient")]
    enable_lua: String,
    #[serde(default, deserialize_with = "lenient")]
    is_admin: String,
}

pub fn parse_security(text: &str, firewall: String) -> Result<SecurityStatus, CollectError> {
    let st = json_records::<WinSecurity>("security", text)?
        .into_iter()
        .next()
        .ok_or_else(|| CollectError::malformed("empty security query output"))?;
    let products: Vec<String> = st
        .antivirus
        .iter()
        .filter(|av| !av.name.is_empty())
        .map(|av| {
            let on = av.state.parse().map(av_enabled).unwrap_or(false);
            format!("{} ({})", av.name, if on { "enabled" } else { "disabled" })
        })
        .collect();
    let uac = match st.enable_lua.as_str() {
        "1" => "On",
        "0" => "Off",
        _ => "Unknown",
    };
    Ok(SecurityStatus {
        antivirus: if products.is_empty() {
            "Not detected".to_string()
        } else {
            products.join(", ")
        },
        firewall,
        uac: uac.to_string(),
        is_admin: is_true(&st.is_admin),
        extra: Vec::new(),
    })
}

/// Summarizes `netsh advfirewall show allprofiles state`.
pub fn parse_firewall_state(text: &str) -> String {
    let states: Vec<bool> = text
        .lines()
        .filter_map(|l| {
            let mut f = l.split_whitespace();
            match (f.next(), f.next()) {
                (Some("State"), Some(v)) => Some(v.eq_ignore_ascii_case("ON")),
                _ => None,
            }
        })
        .collect();
    let on = states.iter().filter(|s| **s).count();
    match (on, states.len()) {
        (_, 0) => "Unknown".to_string(),
        (on, total) if on == total => "On (all profiles)".to_string(),
        (0, _) => "Off".to_string(),
        (on, total) => format!("Partially on ({on}/{total} profiles)"),
    }
}

pub async fn security_status(exec: &CommandExecutor) -> Result<SecurityStatus, CollectError> {
    let firewall = exec
        .run(&CommandLine::new("netsh").args(["advfirewall", "show", "allprofiles", "state"]))
        .await
        .map(|t| parse_firewall_state(&t))
        .unwrap_or_else(|_| "Unknown".to_string());
    parse_security(&powershell(exec, SECURITY_SCRIPT).await?, firewall)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinBattery {
    #[serde(default, deserialize_with = "lenient")]
    estimated_charge_remaining: String,
    #[serde(default, deserialize_with = "lenient")]
    battery_status: String,
    #[serde(default, deserialize_with = "lenient")]
    estimated_run_time: String,
}

pub fn parse_battery(text: &str) -> Result<BatteryInfo, CollectError> {
    let b = json_records::<WinBattery>("Win32_Battery", text)?
        .into_iter()
        .next()
        .ok_or_else(|| CollectError::unsupported("no battery present"))?;
    let percent = parse_f64_loose(&b.estimated_charge_remaining).ok_or_else(|| {
        CollectError::malformed(format!("battery charge '{}'", b.estimated_charge_remaining))
    })?;
    // BatteryStatus 2 means on AC; 71582788 minutes is the "charging" sentinel.
    let plugged = b.battery_status == "2";
    let minutes = b.estimated_run_time.parse::<u64>().ok();
    let time_left = match (plugged, minutes) {
        (true, _) | (_, Some(71_582_788)) => BatteryTime::Unlimited,
        (false, Some(m)) => BatteryTime::Seconds(m * 60),
        (false, None) => BatteryTime::Unknown,
    };
    Ok(BatteryInfo {
        percent,
        plugged,
        time_left,
    })
}

pub async fn battery(exec: &CommandExecutor) -> Result<BatteryInfo, CollectError> {
    parse_battery(&powershell(exec, BATTERY_SCRIPT).await?)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinAdapter {
    #[serde(default, deserialize_with = "lenient")]
    name: String,
    #[serde(default, deserialize_with = "lenient")]
    status: String,
    #[serde(default, deserialize_with = "lenient")]
    mtu_size: String,
    #[serde(default, deserialize_with = "lenient")]
    speed: String,
    #[serde(default, deserialize_with = "lenient")]
    mac_address: String,
    #[serde(rename = "IPv4", default, deserialize_with = "one_or_many")]
    ipv4: Vec<String>,
    #[serde(rename = "IPv6", default, deserialize_with = "one_or_many")]
    ipv6: Vec<String>,
}

pub fn parse_net_adapters(text: &str) -> Result<Vec<NetInterface>, CollectError> {
    let records: Vec<WinAdapter> = json_records("Get-NetAdapter", text)?;
    Ok(records
        .into_iter()
        .filter(|a| !a.name.is_empty())
        .map(|a| NetInterface {
            up: a.status.eq_ignore_ascii_case("up"),
            mtu: a.mtu_size.parse().ok(),
            speed_mbps: parse_u64_loose(&a.speed)
                .map(|bps| bps / 1_000_000)
                .filter(|v| *v > 0),
            mac: a.mac_address.replace('-', ":"),
            ipv4: a.ipv4.iter().filter_map(|v| non_empty(v)).collect(),
            ipv6: a.ipv6.iter().filter_map(|v| non_empty(v)).collect(),
            name: a.name,
            ..NetInterface::default()
        })
        .collect())
}

pub async fn net_ifaces(exec: &CommandExecutor) -> Result<Vec<NetInterface>, CollectError> {
    parse_net_adapters(&powershell(exec, NETWORK_SCRIPT).await?)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinTcpConnection {
    #[serde(default, deserialize_with = "lenient")]
    local_address: String,
    #[serde(default, deserialize_with = "lenient")]
    local_port: String,
    #[serde(default, deserialize_with = "lenient")]
    remote_address: String,
    #[serde(default, deserialize_with = "lenient")]
    remote_port: String,
    #[serde(default, deserialize_with = "lenient")]
    state: String,
    #[serde(default, deserialize_with = "lenient")]
    owning_process: String,
}

fn join_endpoint(addr: &str, port: &str) -> String {
    if addr.contains(':') {
        format!("[{addr}]:{port}")
    } else {
        format!("{addr}:{port}")
    }
}

pub fn parse_tcp_connections(text: &str) -> Result<Vec<Connection>, CollectError> {
    let records: Vec<WinTcpConnection> = json_records("Get-NetTCPConnection", text)?;
    Ok(records
        .into_iter()
        .filter(|c| !c.local_address.is_empty())
        .map(|c| Connection {
            proto: "TCP".to_string(),
            local: join_endpoint(&c.local_address, &c.local_port),
            remote: join_endpoint(&c.remote_address, &c.remote_port),
            status: c.state.to_ascii_uppercase(),
            pid: c.owning_process.parse().ok(),
        })
        .collect())
}

pub async fn net_connections(exec: &CommandExecutor) -> Result<Vec<Connection>, CollectError> {
    parse_tcp_connections(&powershell(exec, CONNECTIONS_SCRIPT).await?)
}

/// Thermal zones report tenths of Kelvin on most firmware; some expose
/// Kelvin or Celsius directly.
pub fn normalize_thermal_zone_temp(raw: f64) -> Option<f64> {
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    let mut v = raw;
    if v > 1000.0 {
        v /= 10.0;
    }
    if v > 200.0 {
        v -= 273.15;
    }
    (0.0..=130.0).contains(&v).then_some(v)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinThermalZone {
    #[serde(default, deserialize_with = "lenient")]
    instance_name: String,
    #[serde(default, deserialize_with = "lenient")]
    current_temperature: String,
    #[serde(default, deserialize_with = "lenient")]
    critical_trip_point: String,
}

pub fn parse_thermal_zones(text: &str) -> Result<Vec<Temperature>, CollectError> {
    let records: Vec<WinThermalZone> = json_records("MSAcpi_ThermalZoneTemperature", text)?;
    Ok(records
        .into_iter()
        .filter(|z| !z.instance_name.is_empty())
        .filter_map(|z| {
            let current =
                normalize_thermal_zone_temp(parse_f64_loose(&z.current_temperature)?)?;
            Some(Temperature {
                label: format!("ACPI {}", z.instance_name),
                current_c: current,
                high_c: None,
                critical_c: parse_f64_loose(&z.critical_trip_point)
                    .and_then(normalize_thermal_zone_temp),
            })
        })
        .collect())
}

pub async fn thermal_zones(exec: &CommandExecutor) -> Result<Vec<Temperature>, CollectError> {
    parse_thermal_zones(&powershell(exec, THERMAL_SCRIPT).await?)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinEvent {
    #[serde(default, deserialize_with = "lenient")]
    time: String,
    #[serde(default, deserialize_with = "lenient")]
    level_display_name: String,
    #[serde(default, deserialize_with = "lenient")]
    provider_name: String,
    #[serde(default, deserialize_with = "lenient")]
    id: String,
    #[serde(default, deserialize_with = "lenient")]
    message: String,
}

/// Collapses whitespace and cuts to `EVENT_MESSAGE_CHARS`.
fn event_message(raw: &str) -> String {
    let message = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if message.chars().count() > EVENT_MESSAGE_CHARS {
        message.chars().take(EVENT_MESSAGE_CHARS).collect::<String>() + "…"
    } else {
        message
    }
}

pub fn parse_events(text: &str) -> Result<Vec<EventRecord>, CollectError> {
    let records: Vec<WinEvent> = json_records("Get-WinEvent", text)?;
    Ok(records
        .into_iter()
        .filter(|e| !e.time.is_empty())
        .map(|e| EventRecord {
            message: event_message(&e.message),
            time: e.time,
            level: e.level_display_name,
            source: e.provider_name,
            event_id: e.id,
        })
        .collect())
}

pub async fn events(exec: &CommandExecutor, limit: usize) -> Result<Vec<EventRecord>, CollectError> {
    parse_events(&powershell(exec, &events_script(limit)).await?)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinBootEvent {
    #[serde(default, deserialize_with = "lenient")]
    time: String,
    #[serde(default, deserialize_with = "lenient")]
    id: String,
}

pub fn parse_boot_events(text: &str) -> Result<Vec<LoginRecord>, CollectError> {
    let records: Vec<WinBootEvent> = json_records("boot events", text)?;
    Ok(records
        .into_iter()
        .filter_map(|e| {
            let what = match e.id.as_str() {
                "6005" => "Event log started (boot)",
                "6006" => "Clean shutdown",
                "6008" => "Unexpected shutdown",
                "1074" => "Shutdown or restart requested",
                _ => return None,
            };
            Some(LoginRecord {
                user: "SYSTEM".to_string(),
                terminal: what.to_string(),
                host: String::new(),
                started: e.time,
                duration: String::new(),
            })
        })
        .collect())
}

pub async fn recent_logins(exec: &CommandExecutor) -> Result<Vec<LoginRecord>, CollectError> {
    parse_boot_events(&powershell(exec, BOOTS_SCRIPT).await?)
}

/// Parses `query user`.
pub fn parse_query_user(text: &str) -> Vec<LoggedInUser> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let line = line.trim_start().trim_start_matches('>');
            let f: Vec<&str> = line.split_whitespace().collect();
            if f.len() < 5 {
                return None;
            }
            // Disconnected sessions have no session name column.
            let (terminal, rest) = if f[1].parse::<u32>().is_ok() {
                (String::new(), &f[1..])
            } else {
                (f[1].to_string(), &f[2..])
            };
            Some(LoggedInUser {
                name: f[0].to_string(),
                terminal,
                host: String::new(),
                started: rest.get(3..).map(|r| r.join(" ")).unwrap_or_default(),
                pid: None,
            })
        })
        .collect()
}

pub async fn users_current(exec: &CommandExecutor) -> Result<Vec<LoggedInUser>, CollectError> {
    Ok(parse_query_user(&exec.run(&CommandLine::new("query").arg("user")).await?))
}

/// Profile names from `netsh wlan show profiles`.
pub fn parse_wifi_profiles(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let (label, value) = line.split_once(':')?;
            if !label.contains("Profile") {
                return None;
            }
            non_empty(value)
        })
        .collect()
}

pub async fn wifi_profiles(exec: &CommandExecutor) -> Result<Vec<String>, CollectError> {
    let text = exec
        .run(&CommandLine::new("netsh").args(["wlan", "show", "profiles"]))
        .await?;
    Ok(parse_wifi_profiles(&text))
}

/// Fields from `netsh wlan show profile name=<x>`; labels not found stay `N/A`.
pub fn parse_wifi_detail(text: &str) -> WifiProfile {
    let mut ssid = None;
    let mut authentication = None;
    let mut cipher = None;
    let mut key = None;
    let mut connection_mode = None;
    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        let slot = match label.trim() {
            "SSID name" => &mut ssid,
            "Authentication" => &mut authentication,
            "Cipher" => &mut cipher,
            "Security key" => &mut key,
            "Connection mode" => &mut connection_mode,
            _ => continue,
        };
        if slot.is_none() {
            *slot = non_empty(value);
        }
    }
    let na = |v: Option<String>| v.unwrap_or_else(|| "N/A".to_string());
    WifiProfile {
        ssid: na(ssid),
        authentication: na(authentication),
        cipher: na(cipher),
        key: na(key),
        connection_mode: na(connection_mode),
    }
}

pub async fn wifi_profile_detail(
    exec: &CommandExecutor,
    name: &str,
) -> Result<WifiProfile, CollectError> {
    let text = exec
        .run(
            &CommandLine::new("netsh")
                .args(["wlan", "show", "profile"])
                .arg(format!("name={name}")),
        )
        .await?;
    Ok(parse_wifi_detail(&text))
}

pub fn parse_active_scheme(text: &str) -> Option<String> {
    let start = text.find('(')? + 1;
    let end = text[start..].find(')')? + start;
    non_empty(&text[start..end])
}

pub async fn power_plan(exec: &CommandExecutor) -> Result<String, CollectError> {
    let text = exec
        .run(&CommandLine::new("powercfg").arg("/getactivescheme"))
        .await?;
    parse_active_scheme(&text)
        .ok_or_else(|| CollectError::malformed(format!("powercfg output '{}'", text.trim())))
}

pub async fn timezone(exec: &CommandExecutor) -> Result<String, CollectError> {
    let text = exec.run(&CommandLine::new("tzutil").arg("/g")).await?;
    non_empty(&text).ok_or_else(|| CollectError::malformed("empty tzutil output"))
}

pub async fn max_cpu_mhz(exec: &CommandExecutor) -> Option<u64> {
    powershell(exec, MAX_CLOCK_SCRIPT)
        .await
        .ok()
        .and_then(|t| t.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn services_and_drivers() {
        let text = r#"[{"Name":"wuauserv","DisplayName":"Windows Update","State":"Running","StartMode":"Manual","ProcessId":1234,"PathName":"C:\\Windows\\system32\\svchost.exe -k netsvcs -p"},{"Name":"Spooler","DisplayName":"Print Spooler","State":"Stopped","StartMode":"Auto","ProcessId":0,"PathName":null}]"#;
        let svc = parse_services(text).expect("services");
        assert_eq!(svc.len(), 2);
        assert_eq!(svc[0].pid, Some(1234));
        assert_eq!(svc[1].pid, None);
        assert_eq!(svc[1].binpath, "");
        assert!(svc[0].binpath.ends_with("-k netsvcs -p"));

        let drv = parse_drivers(r#"{"Name":"ACPI","DisplayName":"Microsoft ACPI Driver","State":"Running","StartMode":"Boot","PathName":"C:\\Windows\\system32\\drivers\\ACPI.sys"}"#)
            .expect("drivers");
        assert_eq!(drv.len(), 1);
        assert_eq!(drv[0].start_mode, "Boot");
    }

    #[test]
    fn pipes_inside_fields_stay_in_their_column() {
        let svc = parse_services(r#"{"Name":"svc","DisplayName":"Backup | Sync Agent","State":"Running","StartMode":"Auto","ProcessId":1234,"PathName":"C:\\bin\\agent.exe"}"#)
            .expect("services");
        assert_eq!(svc[0].display_name, "Backup | Sync Agent");
        assert_eq!(svc[0].status, "Running");
        assert_eq!(svc[0].start_type, "Auto");
        assert_eq!(svc[0].pid, Some(1234));
        assert_eq!(svc[0].binpath, "C:\\bin\\agent.exe");

        let sw = parse_software(r#"[{"DisplayName":"Foo | Bar Tools","DisplayVersion":"2.1","Publisher":"Foo|Bar Inc.","InstallDate":"20240115"},{"DisplayName":"7-Zip 23.01 (x64)","DisplayVersion":"23.01","Publisher":"Igor Pavlov","InstallDate":null}]"#)
            .expect("software");
        assert_eq!(sw[0].name, "Foo | Bar Tools");
        assert_eq!(sw[0].publisher, "Foo|Bar Inc.");
        assert_eq!(sw[0].install_date, "20240115");
        assert_eq!(sw[1].install_date, "");

        let accounts = parse_accounts(r#"{"Name":"alice","FullName":"Alice | Ops","Sid":"S-1-5-21-1-1001","Enabled":true,"IsAdmin":false}"#)
            .expect("accounts");
        assert_eq!(accounts[0].full_name, "Alice | Ops");
        assert_eq!(accounts[0].uid, "S-1-5-21-1-1001");
        assert!(accounts[0].enabled);
        assert!(!accounts[0].is_admin);
    }

    #[test]
    fn empty_and_broken_output() {
        assert!(parse_services("").expect("empty").is_empty());
        assert!(parse_drivers("  \r\n").expect("blank").is_empty());
        assert!(matches!(parse_gpus("Name|RAM"), Err(CollectError::Malformed(_))));
        assert!(matches!(parse_firmware(""), Err(CollectError::Malformed(_))));
    }

    #[test]
    fn security_and_firewall() {
        let text = r#"{"Antivirus":[{"Name":"Windows Defender","State":397568},{"Name":"Old AV","State":393472}],"EnableLua":1,"IsAdmin":false}"#;
        let st = parse_security(text, "On (all profiles)".to_string()).expect("security");
        assert_eq!(st.antivirus, "Windows Defender (enabled), Old AV (disabled)");
        assert_eq!(st.uac, "On");
        assert!(!st.is_admin);

        let single = r#"{"Antivirus":{"Name":"Windows Defender","State":397568},"EnableLua":null,"IsAdmin":true}"#;
        let st = parse_security(single, "Off".to_string()).expect("security");
        assert_eq!(st.antivirus, "Windows Defender (enabled)");
        assert_eq!(st.uac, "Unknown");
        assert!(st.is_admin);

        let none = parse_security(r#"{"Antivirus":[],"EnableLua":0,"IsAdmin":false}"#, "Off".to_string())
            .expect("security");
        assert_eq!(none.antivirus, "Not detected");
        assert_eq!(none.uac, "Off");

        let fw = "Domain Profile Settings:\n----\nState                                 ON\n\nPrivate Profile Settings:\nState                                 ON\n\nPublic Profile Settings:\nState                                 OFF\nOk.\n";
        assert_eq!(parse_firewall_state(fw), "Partially on (2/3 profiles)");
        assert_eq!(parse_firewall_state(""), "Unknown");
    }

    #[test]
    fn wifi_profiles_and_detail() {
        let list = "Profiles on interface Wi-Fi:\n\nGroup policy profiles (read only)\n---------------------------------\n    <None>\n\nUser profiles\n-------------\n    All User Profile     : HomeNet\n    All User Profile     : Cafe Guest\n";
        assert_eq!(parse_wifi_profiles(list), ["HomeNet", "Cafe Guest"]);

        let detail = "Profile HomeNet on interface Wi-Fi:\n\nConnectivity settings\n---------------------\n    Number of SSIDs        : 1\n    SSID name              : \"HomeNet\"\n    Connection mode        : Connect automatically\n\nSecurity settings\n-----------------\n    Authentication         : WPA2-Personal\n    Cipher                 : CCMP\n    Authentication         : WPA2-Personal\n    Cipher                 : GCMP\n    Security key           : Present\n";
        let p = parse_wifi_detail(detail);
        assert_eq!(p.ssid, "HomeNet");
        assert_eq!(p.authentication, "WPA2-Personal");
        assert_eq!(p.cipher, "CCMP");
        assert_eq!(p.key, "Present");
        assert_eq!(p.connection_mode, "Connect automatically");

        let localized = parse_wifi_detail("    Nom du SSID : \"Maison\"\n");
        assert_eq!(localized.ssid, "N/A");
    }

    #[test]
    fn battery_and_thermal() {
        let b = parse_battery(r#"{"EstimatedChargeRemaining":87,"BatteryStatus":1,"EstimatedRunTime":154}"#)
            .expect("battery");
        assert_eq!(b.time_left, BatteryTime::Seconds(154 * 60));
        assert!(!b.plugged);
        let ac = parse_battery(r#"{"EstimatedChargeRemaining":100,"BatteryStatus":2,"EstimatedRunTime":71582788}"#)
            .expect("battery");
        assert_eq!(ac.time_left, BatteryTime::Unlimited);
        assert!(matches!(parse_battery(""), Err(CollectError::Unsupported(_))));

        assert_eq!(normalize_thermal_zone_temp(3232.0).map(|v| v.round()), Some(50.0));
        assert_eq!(normalize_thermal_zone_temp(-1.0), None);
        let zones = parse_thermal_zones(r#"{"InstanceName":"ACPI\\ThermalZone\\TZ00_0","CurrentTemperature":3132,"CriticalTripPoint":3732}"#)
            .expect("zones");
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].label, "ACPI ACPI\\ThermalZone\\TZ00_0");
        assert_eq!(zones[0].critical_c.map(|v| v.round()), Some(100.0));
    }

    #[test]
    fn adapters_and_connections() {
        let nics = parse_net_adapters(r#"[{"Name":"Ethernet","Status":"Up","MtuSize":1500,"Speed":1000000000,"MacAddress":"00-15-5D-01-02-03","IPv4":["192.168.1.10/24"],"IPv6":["fe80::1/64","2001:db8::5/64"]},{"Name":"Wi-Fi","Status":"Disconnected","MtuSize":1500,"Speed":0,"MacAddress":"AA-BB-CC-DD-EE-FF","IPv4":[],"IPv6":"fe80::2/64"}]"#)
            .expect("adapters");
        assert_eq!(nics[0].speed_mbps, Some(1000));
        assert_eq!(nics[0].mtu, Some(1500));
        assert_eq!(nics[0].mac, "00:15:5D:01:02:03");
        assert_eq!(nics[0].ipv6.len(), 2);
        assert!(!nics[1].up);
        assert!(nics[1].ipv4.is_empty());
        assert_eq!(nics[1].ipv6, ["fe80::2/64"]);
        assert_eq!(nics[1].speed_mbps, None);

        let conns = parse_tcp_connections(r#"[{"LocalAddress":"192.168.1.10","LocalPort":50000,"RemoteAddress":"20.1.2.3","RemotePort":443,"State":"Established","OwningProcess":4321},{"LocalAddress":"::","LocalPort":135,"RemoteAddress":"::","RemotePort":0,"State":"Listen","OwningProcess":900}]"#)
            .expect("connections");
        assert_eq!(conns[0].status, "ESTABLISHED");
        assert_eq!(conns[0].remote, "20.1.2.3:443");
        assert_eq!(conns[0].pid, Some(4321));
        assert_eq!(conns[1].local, "[::]:135");
    }

    #[test]
    fn events_logins_and_misc() {
        let events = parse_events(r#"{"Time":"2024-01-15T09:12:00","LevelDisplayName":"Error","ProviderName":"Disk","Id":7,"Message":"The device has a bad block |\r\n  extra"}"#)
            .expect("events");
        assert_eq!(events[0].event_id, "7");
        assert_eq!(events[0].message, "The device has a bad block | extra");
        let long = format!(r#"{{"Time":"t","Id":1,"Message":"{}"}}"#, "x".repeat(300));
        assert_eq!(parse_events(&long).expect("events")[0].message.chars().count(), 201);

        let boots = parse_boot_events(r#"[{"Time":"2024-01-15T09:00:00","Id":6005},{"Time":"2024-01-15T08:59:00","Id":42}]"#)
            .expect("boots");
        assert_eq!(boots.len(), 1);
        assert_eq!(boots[0].terminal, "Event log started (boot)");

        let users = parse_query_user(" USERNAME              SESSIONNAME        ID  STATE   IDLE TIME  LOGON TIME\n>alice                 console             1  Active      none   1/15/2024 9:12 AM\n bob                                       2  Disc        1:05  1/14/2024 6:00 PM\n");
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].terminal, "console");
        assert_eq!(users[0].started, "1/15/2024 9:12 AM");
        assert_eq!(users[1].terminal, "");
        assert_eq!(users[1].started, "1/14/2024 6:00 PM");

        assert_eq!(
            parse_active_scheme("Power Scheme GUID: 381b4222-f694-41f0-9685-ff5bb260df2e  (Balanced)").as_deref(),
            Some("Balanced")
        );
        let fw = parse_firmware(r#"{"BiosVendor":"LENOVO","BiosVersion":"N2HET73W (1.56 )","BiosDate":"2023-05-01","BoardVendor":"LENOVO","BoardModel":"20QDCTO1WW","SystemVendor":"LENOVO","SystemProduct":"20QDCTO1WW","Uuid":"4C4C4544-0042","Serial":""}"#)
            .expect("firmware");
        assert_eq!(fw.uuid.as_deref(), Some("4C4C4544-0042"));
        assert_eq!(fw.serial, None);
        let gpus = parse_gpus(r#"{"Name":"Intel(R) UHD Graphics","AdapterRAM":1073741824,"DriverVersion":"31.0.101.2111","VideoProcessor":"Intel(R) UHD Graphics Family"}"#)
            .expect("gpus");
        assert_eq!(gpus[0].adapter_ram_bytes, Some(1073741824));
    }
}
