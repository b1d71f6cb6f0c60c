use super::format::{or_na, yes_no};
use super::{optional, CollectContext, Collector, CollectorSpec, ANY, WINDOWS_ONLY};
use crate::error::CollectError;
use crate::probe::SoftwareItem;
use crate::report::{Section, SectionKind};
use async_trait::async_trait;
use std::collections::HashSet;

pub struct Users;

const USERS: CollectorSpec = CollectorSpec {
    id: "users",
    title: "User Accounts",
    kind: SectionKind::Table,
    columns: &[
        "Name",
        "Full Name",
        "UID",
        "Home",
        "Shell",
        "Enabled",
        "Administrator",
        "Logged In",
    ],
    weight: 4,
    timeout: None,
    platforms: ANY,
    depends_on: &["who", "dscl", "powershell"],
};

#[async_trait]
impl Collector for Users {
    fn spec(&self) -> &CollectorSpec {
        &USERS
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let accounts = ctx.probe.local_accounts().await?;
        let mut s = USERS.section();
        let sessions = optional(&mut s, "sessions", ctx.probe.users_current().await)?;
        let logged_in: Option<HashSet<String>> =
            sessions.map(|v| v.into_iter().map(|u| u.name.to_lowercase()).collect());

        for a in accounts {
            let online = match &logged_in {
                Some(names) => yes_no(names.contains(&a.name.to_lowercase())),
                None => "Unknown",
            };
            s.push_row([
                a.name.clone(),
                or_na(Some(a.full_name)),
                a.uid,
                or_na(Some(a.home)),
                or_na(Some(a.shell)),
                yes_no(a.enabled).to_string(),
                yes_no(a.is_admin).to_string(),
                online.to_string(),
            ]);
        }
        Ok(s)
    }
}

pub struct Services;

const SERVICES: CollectorSpec = CollectorSpec {
    id: "services",
    title: "Services",
    kind: SectionKind::Table,
    columns: &["Name", "Display Name", "Status", "Start Type", "PID", "Binary Path"],
    weight: 6,
    timeout: None,
    platforms: WINDOWS_ONLY,
    depends_on: &["powershell"],
};

#[async_trait]
impl Collector for Services {
    fn spec(&self) -> &CollectorSpec {
        &SERVICES
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let services = ctx.probe.services().await?;
        let mut s = SERVICES.section();
        for svc in services {
            s.push_row([
                svc.name,
                svc.display_name,
                svc.status,
                svc.start_type,
                or_na(svc.pid),
                or_na(Some(svc.binpath)),
            ]);
        }
        Ok(s)
    }
}

/// Keeps the first entry per name (case-insensitive), ordered by name.
pub fn dedupe_software(items: Vec<SoftwareItem>) -> Vec<SoftwareItem> {
    let mut seen = HashSet::new();
    let mut out: Vec<SoftwareItem> = items
        .into_iter()
        .filter(|i| !i.name.trim().is_empty())
        .filter(|i| seen.insert(i.name.trim().to_lowercase()))
        .collect();
    out.sort_by_key(|i| i.name.to_lowercase());
    out
}

pub struct Software;

const SOFTWARE: CollectorSpec = CollectorSpec {
    id: "software",
    title: "Installed Software",
    kind: SectionKind::Table,
    columns: &["Name", "Version", "Publisher", "Install Date"],
    weight: 8,
    timeout: Some(std::time::Duration::from_secs(90)),
    platforms: ANY,
    depends_on: &["dpkg-query", "rpm", "system_profiler", "powershell"],
};

#[async_trait]
impl Collector for Software {
    fn spec(&self) -> &CollectorSpec {
        &SOFTWARE
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let items = dedupe_software(ctx.probe.installed_software().await?);
        let mut s = SOFTWARE.section();
        for i in items {
            s.push_row([
                i.name,
                or_na(Some(i.version)),
                or_na(Some(i.publisher)),
                or_na(Some(i.install_date)),
            ]);
        }
        Ok(s)
    }
}

pub struct Drivers;

const DRIVERS: CollectorSpec = CollectorSpec {
    id: "drivers",
    title: "Drivers",
    kind: SectionKind::Table,
    columns: &["Name", "Display Name", "State", "Start Mode", "Path"],
    weight: 5,
    timeout: None,
    platforms: WINDOWS_ONLY,
    depends_on: &["powershell"],
};

#[async_trait]
impl Collector for Drivers {
    fn spec(&self) -> &CollectorSpec {
        &DRIVERS
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError> {
        let drivers = ctx.probe.drivers().await?;
        let mut s = DRIVERS.section();
        for d in drivers {
            s.push_row([d.name, d.display_name, d.state, d.start_mode, or_na(Some(d.path))]);
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::probe::ServiceInfo;
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
    async fn software_is_deduplicated_by_name() {
        let s = Software
            .collect(&ctx(MockProbe::new(Os::Linux)))
            .await
            .expect("section");
        assert_eq!(s.column("Name"), ["curl"]);
        assert_eq!(s.column("Version"), ["7.88.1"]);
        assert_eq!(s.column("Install Date"), ["N/A"]);
    }

    #[tokio::test]
    async fn accounts_flag_logged_in_users() {
        let s = Users
            .collect(&ctx(MockProbe::new(Os::Linux)))
            .await
            .expect("section");
        assert_eq!(s.column("Name"), ["root", "alice"]);
        assert_eq!(s.column("Logged In"), ["No", "Yes"]);
        assert_eq!(s.column("Administrator"), ["Yes", "No"]);

        let mut probe = MockProbe::new(Os::Linux);
        probe.users = Err(CollectError::unsupported("who"));
        let s = Users.collect(&ctx(probe)).await.expect("section");
        assert_eq!(s.column("Logged In"), ["Unknown", "Unknown"]);
        assert_eq!(s.status, SectionStatus::Ok);
    }

    #[tokio::test]
    async fn services_on_windows() {
        let mut probe = MockProbe::new(Os::Windows);
        probe.services = Ok(vec![ServiceInfo {
            name: "Spooler".into(),
            display_name: "Print Spooler".into(),
            status: "Stopped".into(),
            start_type: "Auto".into(),
            pid: None,
            binpath: String::new(),
        }]);
        let s = Services.collect(&ctx(probe)).await.expect("section");
        assert_eq!(s.column("PID"), ["N/A"]);
        assert_eq!(s.column("Binary Path"), ["N/A"]);
    }
}
