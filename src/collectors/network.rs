use super::format::{fmt_bytes, or_na};
use super::{CollectContext, Collector, CollectorSpec, ANY, WINDOWS_ONLY};
use crate::error::CollectError;
use crate::report::{Section, SectionKind};
use async_trait::async_trait;

pub struct Network;

const NETWORK: CollectorSpec = CollectorSpec {
    id: "network",
    title: "Network Interfaces",
    kind: SectionKind::Table,
    columns: &[
        "Interface",
        "Status",
        "MTU",
        "Speed",
        "MAC",
        "IPv4",
        "IPv6",
        "Bytes Sent",
        "Bytes Received",
        "Packets Sent",
        "Packets Received",
        "Errors In",
        "Errors Out",
        "Drops In",
        "Drops Out",
    ],
    weight: 6,
    timeout: None,
    platforms: ANY,
    depends_on: &["ip", "ifconfig", "powershell"],
};

#[async_trait]
impl Collector for Network {
    fn spec(&self) -> &CollectorSpec {
        &NETWORK
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let ifaces = ctx.probe.net_ifaces().await?;
        let mut s = NETWORK.section();
        for i in ifaces {
            s.push_row([
                i.name,
                (if i.up { "Active" } else { "Inactive" }).to_string(),
                or_na(i.mtu),
                or_na(i.speed_mbps.map(|m| format!("{m} Mbps"))),
                or_na(Some(i.mac)),
                or_na(Some(i.ipv4.join(", "))),
                or_na(Some(i.ipv6.join(", "))),
                fmt_bytes(i.bytes_sent),
                fmt_bytes(i.bytes_recv),
                i.packets_sent.to_string(),
                i.packets_recv.to_string(),
                i.errin.to_string(),
                i.errout.to_string(),
                i.dropin.to_string(),
                i.dropout.to_string(),
            ]);
        }
        Ok(s)
    }
}

pub struct Connections;

const CONNECTIONS: CollectorSpec = CollectorSpec {
    id: "connections",
    title: "Active Connections",
    kind: SectionKind::Table,
    columns: &["Protocol", "Local Address", "Remote Address", "Status", "PID"],
    weight: 4,
    timeout: None,
    platforms: ANY,
    depends_on: &["ss", "lsof", "powershell"],
};

#[async_trait]
impl Collector for Connections {
    fn spec(&self) -> &CollectorSpec {
        &CONNECTIONS
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let conns = ctx.probe.net_connections().await?;
        let mut s = CONNECTIONS.section();
        for c in conns.into_iter().filter(|c| c.status == "ESTABLISHED") {
            s.push_row([c.proto, c.local, c.remote, c.status, or_na(c.pid)]);
        }
        Ok(s)
    }
}

pub struct Wifi;

const WIFI: CollectorSpec = CollectorSpec {
    id: "wifi",
    title: "WiFi Profiles",
    kind: SectionKind::Table,
    columns: &[
        "Profile",
        "SSID",
        "Authentication",
        "Cipher",
        "Key",
        "Connection Mode",
    ],
    weight: 5,
    timeout: Some(std::time::Duration::from_secs(20)),
    platforms: WINDOWS_ONLY,
    depends_on: &["netsh"],
};

#[async_trait]
impl Collector for Wifi {
    fn spec(&self) -> &CollectorSpec {
        &WIFI
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let profiles = ctx.probe.wifi_profiles().await?;
        let mut s = WIFI.section();
        let mut failed = 0;
        for name in profiles {
            ctx.cancel.check()?;
            match ctx.probe.wifi_profile_detail(&name).await {
                Ok(p) => s.push_row([
                    name,
                    p.ssid,
                    p.authentication,
                    p.cipher,
                    p.key,
                    p.connection_mode,
                ]),
                Err(CollectError::Canceled) => return Err(CollectError::Canceled),
                Err(err) => {
                    failed += 1;
                    tracing::debug!(profile = %name, error = %err, "wifi profile detail failed");
                    s.push_row([name.as_str(), "N/A", "N/A", "N/A", "N/A", "N/A"]);
                }
            }
        }
        if failed > 0 {
            s.mark_partial(format!("{failed} profile(s) could not be read"));
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::probe::WifiProfile;
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
    async fn only_established_connections() {
        let s = Connections
            .collect(&ctx(MockProbe::new(Os::Linux)))
            .await
            .expect("section");
        assert_eq!(s.column("Status"), ["ESTABLISHED"]);
        assert_eq!(s.column("PID"), ["4321"]);
    }

    #[tokio::test]
    async fn interfaces_table() {
        let s = Network
            .collect(&ctx(MockProbe::new(Os::Linux)))
            .await
            .expect("section");
        assert_eq!(s.column("Status"), ["Active"]);
        assert_eq!(s.column("IPv6"), ["N/A"]);
        assert_eq!(s.column("Speed"), ["1000 Mbps"]);
    }

    #[tokio::test]
    async fn wifi_profiles_with_one_unreadable() {
        let mut probe = MockProbe::new(Os::Windows);
        probe.wifi = Ok(vec!["HomeNet".into(), "Gone".into()]);
        probe.wifi_details.insert(
            "HomeNet".into(),
            WifiProfile {
                ssid: "HomeNet".into(),
                authentication: "WPA2-Personal".into(),
                cipher: "CCMP".into(),
                key: "Present".into(),
                connection_mode: "Connect automatically".into(),
            },
        );
        let s = Wifi.collect(&ctx(probe)).await.expect("section");
        assert_eq!(s.column("Profile"), ["HomeNet", "Gone"]);
        assert_eq!(s.column("Key"), ["Present", "N/A"]);
        assert_eq!(s.status, SectionStatus::PartialError);
    }
}
