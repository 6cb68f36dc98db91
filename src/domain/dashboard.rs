// Dashboard domain model - backend settings and the built-in panel catalog
use super::duration::parse_duration;
use super::panel::{
    Aggregator, DataSource, PanelSpec, Theme, TransformOptions, ValueScale, YAxisConfig,
};
use super::telemetry::SeriesKind;

const SYS_TABLE_PREFIX: &str = "machbasedb.sys.";

/// Collector settings read from the backend key-value config store.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub table_name: String,
    pub tag_prefix: String,
    pub interval_secs: u64,
    pub theme: Theme,
    pub nets: Vec<String>,
    pub disks: Vec<String>,
    pub disk_io: Vec<String>,
    pub table_rows: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            table_name: "EXAMPLE".to_string(),
            tag_prefix: String::new(),
            interval_secs: 5,
            theme: Theme::Light,
            nets: Vec::new(),
            disks: Vec::new(),
            disk_io: Vec::new(),
            table_rows: Vec::new(),
        }
    }
}

impl BackendConfig {
    /// Interval strings that parse to zero keep the current value.
    pub fn set_interval(&mut self, text: &str) {
        match parse_duration(text) {
            0 => tracing::warn!("Ignoring unusable interval {:?}", text),
            secs => self.interval_secs = secs,
        }
    }
}

/// Split a comma-joined selection list as stored by the config endpoint.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pick a refresh period that suits the viewed range.
pub fn refresh_for_range(range_secs: u64, configured_interval_secs: u64) -> u64 {
    match range_secs {
        0..=600 => configured_interval_secs.max(1),
        601..=3600 => 60,
        3601..=43_200 => 120,
        _ => 600,
    }
}

/// Strip the system database prefix and upper-case a counter table name.
pub fn normalize_table_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    lower
        .strip_prefix(SYS_TABLE_PREFIX)
        .unwrap_or(&lower)
        .to_uppercase()
}

/// The set of panels shown for one backend configuration and view range.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub panels: Vec<PanelSpec>,
}

impl Dashboard {
    pub fn build(config: &BackendConfig, range_secs: u64) -> Self {
        let source = Self::data_source(config, range_secs);
        let mut panels = host_panels(config, &source);
        panels.extend(database_panels(config, &source));
        Self { panels }
    }

    /// Source shared by every panel for this configuration and view range.
    pub fn data_source(config: &BackendConfig, range_secs: u64) -> DataSource {
        DataSource {
            table_name: config.table_name.clone(),
            tag_prefix: config.tag_prefix.clone(),
            range_secs,
            refresh_secs: refresh_for_range(range_secs, config.interval_secs),
            theme: config.theme,
        }
    }

    #[cfg(test)]
    pub fn panel(&self, id: &str) -> Option<&PanelSpec> {
        self.panels.iter().find(|p| p.id == id)
    }
}

fn percent_axis() -> YAxisConfig {
    YAxisConfig::new(None, Some("{value} %"))
}

fn rate() -> TransformOptions {
    TransformOptions::with_aggregator(Aggregator::Rate)
}

fn host_panels(config: &BackendConfig, source: &DataSource) -> Vec<PanelSpec> {
    let mut panels = vec![
        PanelSpec::new("system_load", "System Load", &["load1", "load5", "load15"], source.clone()),
        PanelSpec::new("cpu_mem", "CPU & MEM", &["cpu.percent", "mem.used_percent"], source.clone())
            .names(&["cpu", "mem"])
            .axis(percent_axis()),
    ];

    for nic in &config.nets {
        let bytes = [format!("net.{nic}.bytes_sent"), format!("net.{nic}.bytes_recv")];
        panels.push(
            PanelSpec::new(panel_id("nic_bytes", nic), format!("NIC Bytes - {nic}"), &as_refs(&bytes), source.clone())
                .names(&["tx", "rx"])
                .axis(YAxisConfig::new(None, Some("{value} MB/s")))
                .transform_all(rate().scaled(ValueScale::BYTES_TO_MIB)),
        );

        let packets = [
            format!("net.{nic}.packets_sent"),
            format!("net.{nic}.packets_recv"),
            format!("net.{nic}.drop_out"),
            format!("net.{nic}.drop_in"),
        ];
        let drops = TransformOptions::with_aggregator(Aggregator::DiffNonNegative).on_axis(1);
        panels.push(
            PanelSpec::new(panel_id("nic_packets", nic), format!("NIC Packets - {nic}"), &as_refs(&packets), source.clone())
                .names(&["tx", "rx", "drop_out", "drop_in"])
                .axis(YAxisConfig::new(Some("tx/rx"), Some("{value} /s")))
                .axis(YAxisConfig::new(Some("drops"), None))
                .transforms(vec![rate().on_axis(0), rate().on_axis(0), drops, drops]),
        );
    }

    for disk in &config.disks {
        let tags = [format!("disk.{disk}.used_percent")];
        panels.push(
            PanelSpec::new(panel_id("disk_usage", disk), format!("Disk {disk} Usage"), &as_refs(&tags), source.clone())
                .names(&[disk.as_str()])
                .axis(percent_axis()),
        );
    }

    for dev in &config.disk_io {
        let tags = [
            format!("diskio.{dev}.write_bytes"),
            format!("diskio.{dev}.read_bytes"),
            format!("diskio.{dev}.write_time"),
            format!("diskio.{dev}.read_time"),
        ];
        let bytes = rate().scaled(ValueScale::BYTES_TO_MIB).on_axis(0);
        let time = rate().on_axis(1);
        panels.push(
            PanelSpec::new(panel_id("diskio", dev), format!("Disk IO - {dev}"), &as_refs(&tags), source.clone())
                .names(&["write", "read", "write_time", "read_time"])
                .axis(YAxisConfig::new(Some("bytes"), Some("{value} MB/s")))
                .axis(YAxisConfig::new(Some("time"), Some("{value} ms/s")))
                .transforms(vec![bytes, bytes, time, time]),
        );
    }

    panels.push(
        PanelSpec::new("host_procs", "Host Processes", &["host.procs"], source.clone()).names(&["procs"]),
    );
    panels
}

fn database_panels(config: &BackendConfig, source: &DataSource) -> Vec<PanelSpec> {
    let mut panels = vec![
        PanelSpec::new("mqtt_io", "MQTT Bytes", &["statz_mqtt_bytes_sent", "statz_mqtt_bytes_recv"], source.clone())
            .names(&["tx", "rx"])
            .axis(YAxisConfig::new(Some("bytes"), Some("{value} KB/s")))
            .transform_all(rate().scaled(ValueScale::BYTES_TO_KIB)),
        PanelSpec::new(
            "mqtt_msgs",
            "MQTT Msg & Pkt",
            &[
                "statz_mqtt_messages_sent",
                "statz_mqtt_messages_recv",
                "statz_mqtt_packets_sent",
                "statz_mqtt_packets_recv",
            ],
            source.clone(),
        )
        .names(&["msg_tx", "msg_rx", "pkt_tx", "pkt_rx"])
        .axis(YAxisConfig::new(None, Some("{value} /s")))
        .transform_all(rate()),
        PanelSpec::new(
            "mqtt_clients",
            "MQTT Clients & Subscriptions",
            &["statz_mqtt_clients_total", "statz_mqtt_subscriptions"],
            source.clone(),
        )
        .names(&["clients", "subscriptions"])
        .axis(YAxisConfig::new(Some("clients"), None))
        .axis(YAxisConfig::new(Some("subs"), None))
        .transforms(vec![TransformOptions::default().on_axis(0), TransformOptions::default().on_axis(1)]),
    ];

    for table in config.table_rows.iter().map(|t| normalize_table_name(t)) {
        let tags = [format!("table_rows_{}", table.to_lowercase())];
        panels.push(
            PanelSpec::new(panel_id("table_rows", &table), format!("Rows Count - {table}"), &as_refs(&tags), source.clone())
                .names(&["increments"])
                .axis(YAxisConfig::new(Some("tps"), Some("{value} /s")))
                .transform_all(rate().as_kind(SeriesKind::Line)),
        );
    }

    panels.extend([
        PanelSpec::new("db_conns", "DB Conns Inflight", &["statz_sess_raw_conns", "statz_sess_conns"], source.clone())
            .names(&["raw_conns", "sess_conns"]),
        PanelSpec::new("db_conns_used", "DB Conns Used", &["statz_sess_conns_used"], source.clone())
            .names(&["sess_conns_used"])
            .axis(YAxisConfig::new(Some("conns"), Some("{value} /s")))
            .transform_all(rate()),
        PanelSpec::new("db_stmts", "DB Stmt Inflight", &["statz_sess_stmts"], source.clone()).names(&["stmt"]),
        PanelSpec::new("db_stmts_used", "DB Stmt Used", &["statz_sess_stmts_used"], source.clone())
            .names(&["stmts_used"])
            .axis(YAxisConfig::new(Some("stmt"), Some("{value} /s")))
            .transform_all(rate()),
        PanelSpec::new("neo_heap", "Neo Heap", &["statz_mem_heap_in_use", "statz_mem_gc_pause_ns"], source.clone())
            .names(&["heap_in_use", "gc_pause"])
            .axis(YAxisConfig::new(Some("heap"), Some("{value} MB")))
            .axis(YAxisConfig::new(Some("gc_pause"), Some("{value} us")))
            .transforms(vec![
                TransformOptions::default()
                    .non_negative()
                    .scaled(ValueScale::BYTES_TO_MIB)
                    .as_kind(SeriesKind::Line)
                    .on_axis(0),
                TransformOptions::with_aggregator(Aggregator::DiffNonNegative)
                    .scaled(ValueScale::NANOS_TO_MICROS)
                    .as_kind(SeriesKind::Bar)
                    .on_axis(1),
            ]),
    ]);
    panels
}

/// Panel ids travel in URL paths, so device names are reduced to `[A-Za-z0-9_]`.
fn panel_id(kind: &str, device: &str) -> String {
    let device: String = device
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{kind}_{device}")
}

fn as_refs(tags: &[String]) -> Vec<&str> {
    tags.iter().map(String::as_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_for_range_tiers() {
        assert_eq!(refresh_for_range(300, 5), 5);
        assert_eq!(refresh_for_range(600, 10), 10);
        assert_eq!(refresh_for_range(1800, 5), 60);
        assert_eq!(refresh_for_range(3 * 3600, 5), 120);
        assert_eq!(refresh_for_range(25 * 3600, 5), 600);
        assert_eq!(refresh_for_range(60, 0), 1);
    }

    #[test]
    fn test_normalize_table_name() {
        assert_eq!(normalize_table_name("MACHBASEDB.SYS.example"), "EXAMPLE");
        assert_eq!(normalize_table_name("tag_data"), "TAG_DATA");
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("eth0, lo,,"), vec!["eth0".to_string(), "lo".to_string()]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_set_interval_keeps_previous_on_garbage() {
        let mut config = BackendConfig::default();
        config.set_interval("10s");
        assert_eq!(config.interval_secs, 10);
        config.set_interval("soon");
        assert_eq!(config.interval_secs, 10);
    }

    #[test]
    fn test_dashboard_expands_selected_devices() {
        let config = BackendConfig {
            nets: vec!["eth0".to_string()],
            disks: vec!["/".to_string()],
            disk_io: vec!["sda".to_string()],
            table_rows: vec!["machbasedb.sys.example".to_string()],
            ..Default::default()
        };
        let dashboard = Dashboard::build(&config, 300);

        for id in ["nic_bytes_eth0", "nic_packets_eth0", "disk_usage__", "diskio_sda", "table_rows_EXAMPLE"] {
            assert!(dashboard.panel(id).is_some(), "missing panel {id}");
        }
        for panel in &dashboard.panels {
            assert!(panel.validate().is_ok(), "invalid panel {}", panel.id);
        }

        let rows = dashboard.panel("table_rows_EXAMPLE").unwrap();
        assert_eq!(rows.tags, vec!["table_rows_example".to_string()]);
    }

    #[test]
    fn test_dashboard_uses_range_tier_for_refresh() {
        let dashboard = Dashboard::build(&BackendConfig::default(), 3600);
        assert!(dashboard.panels.iter().all(|p| p.source.refresh_secs == 60 && p.source.range_secs == 3600));
    }

    #[test]
    fn test_packet_panel_splits_axes() {
        let config = BackendConfig {
            nets: vec!["eth0".to_string()],
            ..Default::default()
        };
        let dashboard = Dashboard::build(&config, 300);
        let packets = dashboard.panel("nic_packets_eth0").unwrap();
        assert_eq!(packets.transform_for(0).aggregator, Aggregator::Rate);
        assert_eq!(packets.transform_for(3).aggregator, Aggregator::DiffNonNegative);
        assert_eq!(packets.transform_for(3).y_axis_index, Some(1));
    }
}
