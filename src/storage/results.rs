//! Result files written next to the host list.
//!
//! The names and layouts follow what downstream plotting and filtering
//! scripts already read: one file per protocol, named after the input file
//! and the parameters that produced it.

use crate::amplification::AmplificationResult;
use crate::batch::{DiscoveryReport, MeasurementReport};
use crate::config::ProbeConfig;
use crate::error::{StorageError, StorageResult};
use crate::types::Protocol;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Marker a discovery input file name must carry.
pub const DISCOVERY_INPUT_MARKER: &str = "_before_filtering";

/// Split `path` into everything before the extension and the extension
/// (with its dot, or empty).
fn split_extension(path: &Path) -> (String, String) {
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let full = path.to_string_lossy();
    let base = full[..full.len() - extension.len()].to_string();
    (base, extension)
}

/// Path of a measurement result file.
///
/// `extra` carries parameters that are not part of the probe configuration,
/// such as whether an EDNS buffer map was supplied.
pub fn measurement_output_path(input: &Path, config: &ProbeConfig, extra: &[(&str, String)]) -> PathBuf {
    let (mut name, extension) = split_extension(input);

    let parameters = config.parameters();
    let labels = parameters
        .iter()
        .map(|(key, value)| (*key, value.as_str()))
        .chain(extra.iter().map(|(key, value)| (*key, value.as_str())));
    for (key, value) in labels {
        name.push_str(&format!("_{}:{}", key, value));
    }
    name.push_str(&format!("_{}_baf{}", config.protocol(), extension));

    PathBuf::from(name)
}

/// Path of the Memcached theoretical BAF map.
pub fn theoretical_output_path(input: &Path) -> PathBuf {
    let (base, extension) = split_extension(input);
    PathBuf::from(format!("{}_memcached_theory_max_baf{}", base, extension))
}

/// Path of a discovery result file: the input name without the
/// `_before_filtering` marker, tagged with the protocol.
pub fn discovery_output_path(input: &Path, config: &ProbeConfig) -> StorageResult<PathBuf> {
    let file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !file_name.contains(DISCOVERY_INPUT_MARKER) {
        return Err(StorageError::InvalidInput {
            path: input.to_path_buf(),
            reason: format!("discovery input names must contain '{}'", DISCOVERY_INPUT_MARKER),
        });
    }

    let stripped = input.with_file_name(file_name.replace(DISCOVERY_INPUT_MARKER, ""));
    let (base, extension) = split_extension(&stripped);
    Ok(PathBuf::from(format!("{}_{}{}", base, config.protocol(), extension)))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).map_err(|e| StorageError::SaveFailed(format!("{}: {}", path.display(), e)))?;
    info!(path = %path.display(), "results written");
    Ok(())
}

/// JSON entry for one amplifier: `[ip, baf]`, or `[[ip, domain], baf]` when
/// the host was probed for its own domain.
fn amplifier_entry(result: &AmplificationResult) -> Value {
    match &result.domain {
        Some(domain) => json!([[result.host.to_string(), domain], result.baf]),
        None => json!([result.host.to_string(), result.baf]),
    }
}

/// A file-name label that only applies to one protocol's result file.
pub type ProtocolLabel = (Protocol, &'static str, String);

/// Write one file per protocol of a measurement report, returning their paths.
///
/// Each entry of `extra` is appended to the name of its own protocol's file
/// only.
pub fn write_measurement(
    input: &Path,
    report: &MeasurementReport,
    extra: &[ProtocolLabel],
) -> StorageResult<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(report.protocols.len() + 1);

    for protocol in &report.protocols {
        let labels: Vec<(&str, String)> = extra
            .iter()
            .filter(|(owner, _, _)| *owner == protocol.config.protocol())
            .map(|(_, key, value)| (*key, value.clone()))
            .collect();
        let path = measurement_output_path(input, &protocol.config, &labels);
        let entries: Vec<Value> = protocol.amplifiers.iter().map(amplifier_entry).collect();
        write_json(&path, &entries)?;
        written.push(path);
    }

    if !report.theoretical_max.is_empty() {
        let path = theoretical_output_path(input);
        write_theoretical(&path, &report.theoretical_max)?;
        written.push(path);
    }

    Ok(written)
}

/// Write the theoretical map as a JSON object from address to BAF.
pub fn write_theoretical(path: &Path, theoretical: &[(IpAddr, f64)]) -> StorageResult<()> {
    let map: Map<String, Value> = theoretical
        .iter()
        .map(|(ip, baf)| (ip.to_string(), json!(baf)))
        .collect();
    write_json(path, &map)
}

/// Write one JSON array of addresses per protocol of a discovery report.
pub fn write_discovery(input: &Path, report: &DiscoveryReport) -> StorageResult<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(report.protocols.len());

    for protocol in &report.protocols {
        let path = discovery_output_path(input, &protocol.config)?;
        let hosts: Vec<String> = protocol.hosts.iter().map(IpAddr::to_string).collect();
        write_json(&path, &hosts)?;
        written.push(path);
    }

    Ok(written)
}

/// Load the advertised EDNS0 buffer sizes collected by an earlier pass.
///
/// The file is a JSON array of single-entry objects `{"<ip>": size}`, where
/// the size may be `null`. Entries are merged into one map; keys that are not
/// addresses are skipped.
pub fn load_max_udp_map(path: &Path) -> StorageResult<HashMap<IpAddr, Option<u16>>> {
    let content = fs::read_to_string(path).map_err(|e| StorageError::InvalidInput {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let entries: Vec<HashMap<String, Option<u16>>> =
        serde_json::from_str(&content).map_err(|e| StorageError::InvalidInput {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut map = HashMap::new();
    for (key, size) in entries.into_iter().flatten() {
        match key.parse::<IpAddr>() {
            Ok(ip) => {
                map.insert(ip, size);
            }
            Err(_) => warn!("Skipping EDNS buffer entry with invalid address: {}", key),
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{ProtocolAmplifiers, ProtocolHosts};
    use crate::config::{DnsConfig, MemcachedConfig, NtpConfig};
    use crate::types::{DnsQueryType, NtpQueryType};

    fn amplifier(ip: &str, domain: Option<&str>, baf: f64) -> AmplificationResult {
        AmplificationResult {
            host: ip.parse().unwrap(),
            domain: domain.map(str::to_string),
            baf,
            request_size: 10,
            response_size: (baf * 10.0) as usize,
            edns_buffer: None,
        }
    }

    #[test]
    fn test_measurement_path_carries_parameters() {
        let dns = ProbeConfig::Dns(DnsConfig::new("example.org", DnsQueryType::Any).unwrap());
        let path = measurement_output_path(
            Path::new("/data/resolvers.json"),
            &dns,
            &[("max_udp_size", "False".to_string())],
        );
        assert_eq!(
            path,
            PathBuf::from("/data/resolvers_domain_ip:example.org_dns_query_type:ANY_max_udp_size:False_dns_baf.json")
        );

        let memcached = ProbeConfig::Memcached(MemcachedConfig::default());
        let path = measurement_output_path(Path::new("/data/mc.json"), &memcached, &[]);
        assert_eq!(path, PathBuf::from("/data/mc_theory_max_baf:True_memcached_baf.json"));
    }

    #[test]
    fn test_discovery_path_drops_marker() {
        let ntp = ProbeConfig::Ntp(NtpConfig::new(NtpQueryType::Basic));
        let path = discovery_output_path(Path::new("/data/ntp_before_filtering.json"), &ntp).unwrap();
        assert_eq!(path, PathBuf::from("/data/ntp_ntp.json"));
    }

    #[test]
    fn test_discovery_path_requires_marker() {
        let ntp = ProbeConfig::Ntp(NtpConfig::new(NtpQueryType::Basic));
        assert!(matches!(
            discovery_output_path(Path::new("/data/ntp.json"), &ntp),
            Err(StorageError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_write_measurement_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("hosts.json");
        let report = MeasurementReport {
            protocols: vec![
                ProtocolAmplifiers {
                    config: ProbeConfig::Dns(DnsConfig::default()),
                    amplifiers: vec![
                        amplifier("192.0.2.1", None, 2.5),
                        amplifier("192.0.2.2", Some("example.org"), 4.0),
                    ],
                },
                ProtocolAmplifiers {
                    config: ProbeConfig::Memcached(MemcachedConfig::default()),
                    amplifiers: Vec::new(),
                },
            ],
            theoretical_max: vec![("192.0.2.9".parse().unwrap(), 16384.0)],
            hosts_probed: 3,
        };

        let written = write_measurement(&input, &report, &[]).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(written[1], dir.path().join("hosts_theory_max_baf:True_memcached_baf.json"));

        let dns: Value = serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(dns, json!([["192.0.2.1", 2.5], [["192.0.2.2", "example.org"], 4.0]]));

        let memcached: Value = serde_json::from_str(&fs::read_to_string(&written[1]).unwrap()).unwrap();
        assert_eq!(memcached, json!([]));

        let theory: Value = serde_json::from_str(&fs::read_to_string(&written[2]).unwrap()).unwrap();
        assert_eq!(theory, json!({"192.0.2.9": 16384.0}));
    }

    #[test]
    fn test_protocol_labels_stay_on_their_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("ips.json");
        let report = MeasurementReport {
            protocols: vec![
                ProtocolAmplifiers {
                    config: ProbeConfig::Dns(DnsConfig::new("example.org", DnsQueryType::Any).unwrap()),
                    amplifiers: Vec::new(),
                },
                ProtocolAmplifiers {
                    config: ProbeConfig::Ntp(NtpConfig::new(NtpQueryType::Monlist)),
                    amplifiers: Vec::new(),
                },
            ],
            theoretical_max: Vec::new(),
            hosts_probed: 1,
        };

        let written = write_measurement(
            &input,
            &report,
            &[(Protocol::Dns, "max_udp_size", "False".to_string())],
        )
        .unwrap();

        assert_eq!(
            written,
            vec![
                dir.path().join("ips_domain_ip:example.org_dns_query_type:ANY_max_udp_size:False_dns_baf.json"),
                dir.path().join("ips_ntp_query_type:monlist_ntp_baf.json"),
            ]
        );
    }

    #[test]
    fn test_write_discovery_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan_before_filtering.json");
        let report = DiscoveryReport {
            protocols: vec![ProtocolHosts {
                config: ProbeConfig::Memcached(MemcachedConfig::default()),
                hosts: vec!["192.0.2.1".parse().unwrap(), "192.0.2.3".parse().unwrap()],
            }],
            hosts_probed: 4,
        };

        let written = write_discovery(&input, &report).unwrap();
        assert_eq!(written, vec![dir.path().join("scan_memcached.json")]);

        let hosts: Vec<String> = serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(hosts, vec!["192.0.2.1", "192.0.2.3"]);
    }

    #[test]
    fn test_load_max_udp_map_merges_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolvers_max_udp.json");
        fs::write(
            &path,
            r#"[{"192.0.2.1": 1232}, {"192.0.2.2": null}, {"not-an-ip": 512}, {"192.0.2.3": 4096}]"#,
        )
        .unwrap();

        let map = load_max_udp_map(&path).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map[&"192.0.2.1".parse::<IpAddr>().unwrap()], Some(1232));
        assert_eq!(map[&"192.0.2.2".parse::<IpAddr>().unwrap()], None);
    }

    #[test]
    fn test_load_max_udp_map_rejects_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{"192.0.2.1": 1232}"#).unwrap();

        assert!(matches!(
            load_max_udp_map(&path),
            Err(StorageError::InvalidInput { .. })
        ));
        assert!(load_max_udp_map(&dir.path().join("missing.json")).is_err());
    }
}
