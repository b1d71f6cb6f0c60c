use super::format::{or_na, yes_no};
use super::{CollectContext, Collector, CollectorSpec, ANY, WINDOWS_ONLY};
use crate::error::CollectError;
use crate::report::{Section, SectionKind};
use async_trait::async_trait;

pub struct Security;

const SECURITY: CollectorSpec = CollectorSpec {
    id: "security",
    title: "Security Audit",
    kind: SectionKind::Table,
    columns: &["Check", "Status"],
    weight: 5,
    timeout: None,
    platforms: ANY,
    depends_on: &["ufw", "firewall-cmd", "socketfilterfw", "netsh", "powershell"],
};

#[async_trait]
impl Collector for Security {
    fn spec(&self) -> &CollectorSpec {
        &SECURITY
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let st = ctx.probe.security_status().await?;
        let mut s = SECURITY.section();
        s.push_row(["Antivirus", st.antivirus.as_str()]);
        s.push_row(["Firewall", st.firewall.as_str()]);
        s.push_row(["UAC", st.uac.as_str()]);
        s.push_row(["Running Elevated", yes_no(st.is_admin)]);
        for (check, status) in st.extra {
            s.push_row([check, status]);
        }
        Ok(s)
    }
}

pub struct Logs;

const LOGS: CollectorSpec = CollectorSpec {
    id: "logs",
    title: "System Logs",
    kind: SectionKind::Table,
    columns: &["User", "Terminal", "Host", "Started", "Duration"],
    weight: 3,
    timeout: None,
    platforms: ANY,
    depends_on: &["last", "who", "query"],
};

#[async_trait]
impl Collector for Logs {
    fn spec(&self) -> &CollectorSpec {
        &LOGS
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let logins = ctx.probe.recent_logins().await;
        let sessions = ctx.probe.users_current().await;
        let mut s = LOGS.section();

        let (logins, sessions) = match (logins, sessions) {
            (Err(CollectError::Canceled), _) | (_, Err(CollectError::Canceled)) => {
                return Err(CollectError::Canceled)
            }
            (Err(err), Err(_)) => return Err(err),
            (Ok(l), Err(err)) => {
                if !matches!(err, CollectError::Unsupported(_)) {
                    s.mark_partial(format!("current sessions: {err}"));
                }
                (l, Vec::new())
            }
            (Err(err), Ok(u)) => {
                if !matches!(err, CollectError::Unsupported(_)) {
                    s.mark_partial(format!("login history: {err}"));
                }
                (Vec::new(), u)
            }
            (Ok(l), Ok(u)) => (l, u),
        };

        for l in logins {
            s.push_row([l.user, l.terminal, or_na(Some(l.host)), l.started, or_na(Some(l.duration))]);
        }
        for u in sessions {
            s.push_row([
                u.name,
                or_na(Some(u.terminal)),
                or_na(Some(u.host)),
                u.started,
                "still logged in".to_string(),
            ]);
        }
        Ok(s)
    }
}

pub struct Events;

const EVENTS: CollectorSpec = CollectorSpec {
    id: "events",
    title: "Event Log Summary",
    kind: SectionKind::Table,
    columns: &["Time", "Level", "Source", "Event ID", "Message"],
    weight: 5,
    timeout: None,
    platforms: WINDOWS_ONLY,
    depends_on: &["powershell"],
};

#[async_trait]
impl Collector for Events {
    fn spec(&self) -> &CollectorSpec {
        &EVENTS
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let events = ctx.probe.events(ctx.events_limit).await?;
        let mut s = EVENTS.section();
        for e in events.into_iter().take(ctx.events_limit) {
            s.push_row([e.time, e.level, e.source, e.event_id, e.message]);
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::probe::EventRecord;
    use crate::report::SectionStatus;
    use crate::runner::Os;
    use crate::test_support::MockProbe;
    use std::sync::Arc;

    fn ctx(probe: MockProbe, events_limit: usize) -> CollectContext {
        CollectContext {
            probe: Arc::new(probe),
            cancel: CancelToken::never(),
            events_limit,
        }
    }

    #[tokio::test]
    async fn security_rows() {
        let s = Security
            .collect(&ctx(MockProbe::new(Os::Linux), 50))
            .await
            .expect("section");
        assert_eq!(
            s.column("Check"),
            ["Antivirus", "Firewall", "UAC", "Running Elevated", "AppArmor"]
        );
        assert_eq!(s.column("Status")[1], "On (ufw)");
    }

    #[tokio::test]
    async fn logs_merge_history_and_sessions() {
        let s = Logs
            .collect(&ctx(MockProbe::new(Os::Linux), 50))
            .await
            .expect("section");
        assert_eq!(s.column("User"), ["reboot", "alice"]);
        assert_eq!(s.column("Duration")[1], "still logged in");

        let mut probe = MockProbe::new(Os::Linux);
        probe.logins = Err(CollectError::malformed("wtmp"));
        let s = Logs.collect(&ctx(probe, 50)).await.expect("section");
        assert_eq!(s.status, SectionStatus::PartialError);
        assert_eq!(s.rows.len(), 1);
    }

    #[tokio::test]
    async fn events_are_bounded() {
        let mut probe = MockProbe::new(Os::Windows);
        probe.events = Ok((0..10)
            .map(|i| EventRecord {
                time: format!("2024-01-15T09:0{i}:00"),
                level: "Error".into(),
                source: "Disk".into(),
                event_id: "7".into(),
                message: "bad block".into(),
            })
            .collect());
        let s = Events.collect(&ctx(probe, 3)).await.expect("section");
        assert_eq!(s.rows.len(), 3);
    }
}
