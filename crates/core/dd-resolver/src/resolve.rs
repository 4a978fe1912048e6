use std::collections::BTreeSet;
use std::net::IpAddr;

use dd_common::types::{DisplayEntry, Environment, EnvironmentRef, PortBinding, ProxyHost, RawRecord, UNGROUPED};
use tracing::warn;

use crate::icon::icon_url;
use crate::labels;

/// Derive the display entry for one record, or `None` when the record is
/// disabled, not running, or has nothing reachable.
pub fn resolve(
    record: &RawRecord,
    environment: &Environment,
    proxy_hosts: Option<&[ProxyHost]>,
) -> Option<DisplayEntry> {
    if record.label(labels::DISABLE).is_some_and(labels::is_truthy) {
        return None;
    }
    if record.state != "running" {
        return None;
    }

    let ports = reachable_ports(&record.ports);
    let address = network_address(record);
    if ports.is_empty() && address.is_none() {
        return None;
    }

    let group = record.label(labels::GROUP).unwrap_or(UNGROUPED).to_string();
    let display_name = display_name(record).to_string();
    let url = resolve_url(record, environment, &ports, address, proxy_hosts);
    let icon = record.label(labels::ICON);

    Some(DisplayEntry {
        id: format!("{}:{}", environment.id, record.id),
        icon_url: icon_url(icon, &display_name),
        icon: icon.map(String::from),
        display_name,
        group,
        environment_ref: EnvironmentRef::from(environment),
        url,
        image: record.image.clone(),
    })
}

/// Name label, then compose service, then the raw record name.
fn display_name(record: &RawRecord) -> &str {
    record
        .label(labels::NAME)
        .or_else(|| record.label(labels::COMPOSE_SERVICE))
        .or_else(|| Some(record.name.trim().trim_start_matches('/')).filter(|n| !n.is_empty()))
        .unwrap_or(&record.id)
}

/// Externally published TCP ports, ascending and unique.
pub fn reachable_ports(ports: &[PortBinding]) -> Vec<u16> {
    ports
        .iter()
        .filter(|p| p.is_tcp() && is_external_bind(&p.ip))
        .filter_map(|p| p.public_port)
        .filter(|&port| port != 0)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// IPv4 wildcard and an absent bind address count as external.
/// IPv6-any duplicates and loopback bindings do not.
fn is_external_bind(ip: &str) -> bool {
    let ip = ip.trim().trim_start_matches('[').trim_end_matches(']');
    if ip.is_empty() || ip == "0.0.0.0" {
        return true;
    }
    if ip.eq_ignore_ascii_case("localhost") {
        return false;
    }
    match ip.parse::<IpAddr>() {
        Ok(addr) => !addr.is_loopback() && !addr.is_unspecified(),
        Err(_) => true,
    }
}

/// Address on the dashboard network, if any.
pub fn network_address(record: &RawRecord) -> Option<&str> {
    record
        .networks
        .get(labels::NETWORK)
        .map(|n| n.ip_address.trim())
        .filter(|addr| !addr.is_empty() && *addr != "0.0.0.0")
}

/// URL priority: explicit label, matching proxy host, published port,
/// network address, then the bare environment address.
pub fn resolve_url(
    record: &RawRecord,
    environment: &Environment,
    ports: &[u16],
    address: Option<&str>,
    proxy_hosts: Option<&[ProxyHost]>,
) -> String {
    if let Some(url) = record.label(labels::URL) {
        return url.to_string();
    }

    if let Some(&port) = ports.first() {
        if let Some(url) = proxy_hosts.and_then(|hosts| proxy_url(hosts, &environment.public_ip, port)) {
            return url;
        }
        return format!("http://{}:{}", environment.public_ip, port);
    }

    if let Some(address) = address {
        return match label_port(record) {
            Some(port) => format!("http://{address}:{port}"),
            None => format!("http://{address}"),
        };
    }

    format!("http://{}", environment.public_ip)
}

/// Port label appended to the network address; an unparsable value is
/// logged and ignored.
fn label_port(record: &RawRecord) -> Option<u16> {
    let raw = record.label(labels::PORT)?;
    match raw.parse::<u16>() {
        Ok(port) => Some(port),
        Err(e) => {
            warn!(record = %record.id, value = raw, "Ignoring invalid {} label: {e}", labels::PORT);
            None
        }
    }
}

/// First enabled proxy host forwarding to `host:port`, in table order.
fn proxy_url(hosts: &[ProxyHost], host: &str, port: u16) -> Option<String> {
    if host.is_empty() {
        return None;
    }
    hosts
        .iter()
        .filter(|h| h.enabled && h.forward_port == port && h.forward_host.trim().eq_ignore_ascii_case(host))
        .find_map(|h| {
            h.domain_names
                .first()
                .map(|d| d.trim())
                .filter(|d| !d.is_empty())
                .map(|domain| format!("{}://{}", h.scheme(), domain))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dd_common::types::NetworkAttachment;
    use proptest::prelude::*;
    use serde_json::json;

    fn env() -> Environment {
        Environment {
            id: "1".into(),
            name: "local".into(),
            kind: None,
            public_ip: "10.0.0.5".into(),
        }
    }

    fn port(ip: &str, public: Option<u16>, protocol: &str) -> PortBinding {
        PortBinding {
            ip: ip.into(),
            private_port: Some(80),
            public_port: public,
            protocol: Some(protocol.into()),
        }
    }

    fn record() -> RawRecord {
        RawRecord {
            id: "abc".into(),
            name: "web".into(),
            image: "nginx:latest".into(),
            state: "running".into(),
            ports: vec![port("0.0.0.0", Some(8080), "tcp")],
            ..Default::default()
        }
    }

    fn with_labels(mut record: RawRecord, labels: &[(&str, &str)]) -> RawRecord {
        for (k, v) in labels {
            record.labels.insert(k.to_string(), v.to_string());
        }
        record
    }

    fn proxy_host() -> ProxyHost {
        ProxyHost {
            enabled: true,
            domain_names: vec!["app.example.com".into()],
            forward_host: "10.0.0.5".into(),
            forward_port: 8080,
            ssl_forced: true,
            certificate_id: json!(null),
        }
    }

    #[test]
    fn test_plain_record() {
        let entry = resolve(&record(), &env(), None).unwrap();
        assert_eq!(entry.url, "http://10.0.0.5:8080");
        assert_eq!(entry.group, "ungrouped");
        assert_eq!(entry.display_name, "web");
        assert_eq!(entry.id, "1:abc");
        assert_eq!(entry.environment_ref.public_ip, "10.0.0.5");
        assert_eq!(entry.image, "nginx:latest");
        assert!(entry.icon.is_none());
    }

    #[test]
    fn test_labels_override_everything() {
        let record = with_labels(
            record(),
            &[
                (labels::GROUP, "Fun"),
                (labels::NAME, "My App"),
                (labels::URL, "https://myapp.example.com"),
            ],
        );
        let hosts = [proxy_host()];
        let entry = resolve(&record, &env(), Some(&hosts)).unwrap();
        assert_eq!(entry.url, "https://myapp.example.com");
        assert_eq!(entry.group, "Fun");
        assert_eq!(entry.display_name, "My App");
        assert!(entry.icon_url.ends_with("/my-app.png"));
    }

    #[test]
    fn test_proxy_host_preferred_over_synthesized() {
        let hosts = [proxy_host()];
        let entry = resolve(&record(), &env(), Some(&hosts)).unwrap();
        assert_eq!(entry.url, "https://app.example.com");
    }

    #[test]
    fn test_proxy_host_scheme_and_order() {
        let mut disabled = proxy_host();
        disabled.enabled = false;
        disabled.domain_names = vec!["disabled.example.com".into()];
        let mut plain = proxy_host();
        plain.ssl_forced = false;
        plain.domain_names = vec!["plain.example.com".into(), "alt.example.com".into()];
        let mut certified = proxy_host();
        certified.ssl_forced = false;
        certified.certificate_id = json!(4);
        certified.domain_names = vec!["cert.example.com".into()];

        let hosts = [disabled, plain, certified.clone()];
        let entry = resolve(&record(), &env(), Some(&hosts)).unwrap();
        assert_eq!(entry.url, "http://plain.example.com");

        let hosts = [certified];
        let entry = resolve(&record(), &env(), Some(&hosts)).unwrap();
        assert_eq!(entry.url, "https://cert.example.com");
    }

    #[test]
    fn test_proxy_host_must_match_ip_and_first_port() {
        let mut other_port = proxy_host();
        other_port.forward_port = 9090;
        let mut other_host = proxy_host();
        other_host.forward_host = "10.0.0.6".into();

        let mut record = record();
        record.ports.push(port("0.0.0.0", Some(9090), "tcp"));
        let hosts = [other_port, other_host];
        let entry = resolve(&record, &env(), Some(&hosts)).unwrap();
        assert_eq!(entry.url, "http://10.0.0.5:8080");
    }

    #[test]
    fn test_not_running_is_absent() {
        for state in ["exited", "paused", "restarting", "", "Running", "RUNNING", " running"] {
            let mut record = record();
            record.state = state.into();
            assert!(resolve(&record, &env(), None).is_none(), "state {state}");
        }
    }

    #[test]
    fn test_disable_label() {
        for value in ["true", "1", "TRUE", " true "] {
            let record = with_labels(record(), &[(labels::DISABLE, value), (labels::URL, "https://x")]);
            assert!(resolve(&record, &env(), None).is_none(), "value {value}");
        }
        let record = with_labels(record(), &[(labels::DISABLE, "false")]);
        assert!(resolve(&record, &env(), None).is_some());
    }

    #[test]
    fn test_port_filters() {
        let ports = vec![
            port("::", Some(8080), "tcp"),
            port("127.0.0.1", Some(9000), "tcp"),
            port("::1", Some(9001), "tcp"),
            port("0.0.0.0", Some(53), "udp"),
            port("0.0.0.0", None, "tcp"),
            port("0.0.0.0", Some(8443), "tcp"),
            port("192.168.1.10", Some(3000), "tcp"),
            port("", Some(8443), "tcp"),
        ];
        assert_eq!(reachable_ports(&ports), vec![3000, 8443]);
    }

    #[test]
    fn test_unreachable_record_is_absent() {
        let mut record = record();
        record.ports = vec![port("127.0.0.1", Some(8080), "tcp")];
        assert!(resolve(&record, &env(), None).is_none());

        record.networks.insert(
            labels::NETWORK.into(),
            NetworkAttachment {
                ip_address: "0.0.0.0".into(),
            },
        );
        assert!(resolve(&record, &env(), None).is_none());
    }

    #[test]
    fn test_network_address_url() {
        let mut record = record();
        record.ports.clear();
        record.networks.insert(
            labels::NETWORK.into(),
            NetworkAttachment {
                ip_address: "172.20.0.4".into(),
            },
        );
        record.networks.insert(
            "bridge".into(),
            NetworkAttachment {
                ip_address: "172.17.0.2".into(),
            },
        );
        let entry = resolve(&record, &env(), None).unwrap();
        assert_eq!(entry.url, "http://172.20.0.4");

        let record = with_labels(record, &[(labels::PORT, "8096")]);
        let entry = resolve(&record, &env(), None).unwrap();
        assert_eq!(entry.url, "http://172.20.0.4:8096");
    }

    #[test]
    fn test_invalid_port_label_ignored() {
        let mut record = record();
        record.ports.clear();
        record.networks.insert(
            labels::NETWORK.into(),
            NetworkAttachment {
                ip_address: "172.20.0.4".into(),
            },
        );
        for value in ["http", "70000", "-1", "80a"] {
            let record = with_labels(record.clone(), &[(labels::PORT, value)]);
            let entry = resolve(&record, &env(), None).unwrap();
            assert_eq!(entry.url, "http://172.20.0.4", "value {value}");
        }
    }

    #[test]
    fn test_fallback_url() {
        let url = resolve_url(&record(), &env(), &[], None, None);
        assert_eq!(url, "http://10.0.0.5");
    }

    #[test]
    fn test_display_name_chain() {
        let mut record = with_labels(record(), &[(labels::COMPOSE_SERVICE, "grafana")]);
        record.name = "/stack-grafana-1".into();
        assert_eq!(resolve(&record, &env(), None).unwrap().display_name, "grafana");

        record.labels.clear();
        assert_eq!(resolve(&record, &env(), None).unwrap().display_name, "stack-grafana-1");
    }

    #[test]
    fn test_environment_ref_is_a_copy() {
        let mut environment = env();
        let entry = resolve(&record(), &environment, None).unwrap();
        environment.public_ip = "192.168.0.1".into();
        assert_eq!(entry.environment_ref.public_ip, "10.0.0.5");
    }

    fn port_strategy() -> impl Strategy<Value = PortBinding> {
        (
            prop::sample::select(vec!["0.0.0.0", "::", "127.0.0.1", "", "10.1.2.3"]),
            prop::option::of(0u16..20),
            prop::sample::select(vec!["tcp", "udp"]),
        )
            .prop_map(|(ip, public, protocol)| port(ip, public, protocol))
    }

    proptest! {
        #[test]
        fn prop_port_extraction_order_independent(
            (ports, shuffled) in prop::collection::vec(port_strategy(), 0..12)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            let sorted = reachable_ports(&ports);
            prop_assert_eq!(&sorted, &reachable_ports(&shuffled));
            prop_assert!(sorted.windows(2).all(|w| w[0] < w[1]));

            // Feeding the result back in as wildcard bindings is a fixed point.
            let again: Vec<PortBinding> = sorted.iter().map(|&p| port("0.0.0.0", Some(p), "tcp")).collect();
            prop_assert_eq!(reachable_ports(&again), sorted);
        }

        #[test]
        fn prop_non_running_always_absent(state in ".{0,10}") {
            prop_assume!(state != "running");
            let mut record = record();
            record.state = state;
            prop_assert!(resolve(&record, &env(), None).is_none());
        }
    }
}
