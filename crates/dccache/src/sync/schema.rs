#![forbid(unsafe_code)]

//! Column layout of every configuration table.

/// One column of a configuration table, excluding the id column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    /// Value used when a row is built without this column.
    pub default: &'static str,
}

const fn col(name: &'static str, default: &'static str) -> Column {
    Column { name, default }
}

/// Configuration tables in synchronization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Config,
    AutoregPsk,
    Hosts,
    HostInventory,
    HostGroups,
    HostsGroups,
    HostTags,
    Interfaces,
    InterfaceSnmp,
    GlobalMacros,
    HostMacros,
    Items,
    ItemDiscovery,
    ItemPreproc,
    ItemParameters,
    ItemTags,
    Triggers,
    TriggerDepends,
    Functions,
    TriggerTags,
    Correlations,
    Drules,
    Dchecks,
    HttpTests,
    HttpSteps,
    Proxies,
    ProxyGroups,
    HostProxy,
}

impl TableKind {
    /// Every table, in the order a pass applies them.
    pub const ALL: [TableKind; 28] = [
        Self::Config,
        Self::AutoregPsk,
        Self::Hosts,
        Self::HostInventory,
        Self::HostGroups,
        Self::HostsGroups,
        Self::HostTags,
        Self::Interfaces,
        Self::InterfaceSnmp,
        Self::GlobalMacros,
        Self::HostMacros,
        Self::Items,
        Self::ItemDiscovery,
        Self::ItemPreproc,
        Self::ItemParameters,
        Self::ItemTags,
        Self::Triggers,
        Self::TriggerDepends,
        Self::Functions,
        Self::TriggerTags,
        Self::Correlations,
        Self::Drules,
        Self::Dchecks,
        Self::HttpTests,
        Self::HttpSteps,
        Self::Proxies,
        Self::ProxyGroups,
        Self::HostProxy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::AutoregPsk => "autoreg_psk",
            Self::Hosts => "hosts",
            Self::HostInventory => "host_inventory",
            Self::HostGroups => "hstgrp",
            Self::HostsGroups => "hosts_groups",
            Self::HostTags => "host_tag",
            Self::Interfaces => "interface",
            Self::InterfaceSnmp => "interface_snmp",
            Self::GlobalMacros => "globalmacro",
            Self::HostMacros => "hostmacro",
            Self::Items => "items",
            Self::ItemDiscovery => "item_discovery",
            Self::ItemPreproc => "item_preproc",
            Self::ItemParameters => "item_parameter",
            Self::ItemTags => "item_tag",
            Self::Triggers => "triggers",
            Self::TriggerDepends => "trigger_depends",
            Self::Functions => "functions",
            Self::TriggerTags => "trigger_tag",
            Self::Correlations => "correlation",
            Self::Drules => "drules",
            Self::Dchecks => "dchecks",
            Self::HttpTests => "httptest",
            Self::HttpSteps => "httpstep",
            Self::Proxies => "proxy",
            Self::ProxyGroups => "proxy_group",
            Self::HostProxy => "host_proxy",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Name of the primary key column.
    pub fn id_column(self) -> &'static str {
        match self {
            Self::Config => "configid",
            Self::AutoregPsk => "autoreg_tlsid",
            Self::Hosts | Self::HostInventory => "hostid",
            Self::HostGroups => "groupid",
            Self::HostsGroups => "hostgroupid",
            Self::HostTags => "hosttagid",
            Self::Interfaces | Self::InterfaceSnmp => "interfaceid",
            Self::GlobalMacros => "globalmacroid",
            Self::HostMacros => "hostmacroid",
            Self::Items => "itemid",
            Self::ItemDiscovery => "itemdiscoveryid",
            Self::ItemPreproc => "item_preprocid",
            Self::ItemParameters => "item_parameterid",
            Self::ItemTags => "itemtagid",
            Self::Triggers => "triggerid",
            Self::TriggerDepends => "triggerdepid",
            Self::Functions => "functionid",
            Self::TriggerTags => "triggertagid",
            Self::Correlations => "correlationid",
            Self::Drules => "druleid",
            Self::Dchecks => "dcheckid",
            Self::HttpTests => "httptestid",
            Self::HttpSteps => "httpstepid",
            Self::Proxies => "proxyid",
            Self::ProxyGroups => "proxy_groupid",
            Self::HostProxy => "hostproxyid",
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            Self::Config => CONFIG,
            Self::AutoregPsk => AUTOREG_PSK,
            Self::Hosts => HOSTS,
            Self::HostInventory => HOST_INVENTORY,
            Self::HostGroups => HOST_GROUPS,
            Self::HostsGroups => HOSTS_GROUPS,
            Self::HostTags => HOST_TAGS,
            Self::Interfaces => INTERFACES,
            Self::InterfaceSnmp => INTERFACE_SNMP,
            Self::GlobalMacros => GLOBAL_MACROS,
            Self::HostMacros => HOST_MACROS,
            Self::Items => ITEMS,
            Self::ItemDiscovery => ITEM_DISCOVERY,
            Self::ItemPreproc => ITEM_PREPROC,
            Self::ItemParameters => ITEM_PARAMETERS,
            Self::ItemTags => ITEM_TAGS,
            Self::Triggers => TRIGGERS,
            Self::TriggerDepends => TRIGGER_DEPENDS,
            Self::Functions => FUNCTIONS,
            Self::TriggerTags => TRIGGER_TAGS,
            Self::Correlations => CORRELATIONS,
            Self::Drules => DRULES,
            Self::Dchecks => DCHECKS,
            Self::HttpTests => HTTP_TESTS,
            Self::HttpSteps => HTTPSTEPS,
            Self::Proxies => PROXIES,
            Self::ProxyGroups => PROXY_GROUPS,
            Self::HostProxy => HOST_PROXY,
        }
    }

    /// Position of `name` among the columns.
    pub fn column_index(self, name: &str) -> Option<usize> {
        self.columns().iter().position(|column| column.name == name)
    }
}

const CONFIG: &[Column] = &[
    col("refresh_unsupported", "10m"),
    col("default_timezone", "system"),
    col("hk_history_global", "0"),
    col("hk_history", "90d"),
    col("hk_trends_global", "0"),
    col("hk_trends", "365d"),
    col("autoreg_tls_accept", "1"),
    col("timeout_agent", "3s"),
    col("timeout_simple", "3s"),
    col("timeout_snmp", "3s"),
    col("timeout_external", "3s"),
    col("timeout_odbc", "3s"),
    col("timeout_http", "3s"),
    col("timeout_ssh", "3s"),
    col("timeout_telnet", "3s"),
    col("timeout_script", "3s"),
    col("timeout_browser", "60s"),
];

const HOSTS: &[Column] = &[
    col("host", ""),
    col("name", ""),
    col("status", "0"),
    col("monitored_by", "0"),
    col("proxyid", "0"),
    col("proxy_groupid", "0"),
    col("maintenanceid", "0"),
    col("maintenance_status", "0"),
    col("maintenance_type", "0"),
    col("maintenance_from", "0"),
    col("tls_connect", "1"),
    col("tls_accept", "1"),
    col("tls_issuer", ""),
    col("tls_subject", ""),
    col("tls_psk_identity", ""),
    col("tls_psk", ""),
];

const HOST_INVENTORY: &[Column] = &[
    col("inventory_mode", "0"),
    col("type", ""),
    col("name", ""),
    col("alias", ""),
    col("os", ""),
    col("serialno_a", ""),
    col("tag", ""),
    col("asset_tag", ""),
    col("macaddress_a", ""),
    col("hardware", ""),
    col("software", ""),
    col("contact", ""),
    col("location", ""),
    col("location_lat", ""),
    col("location_lon", ""),
    col("notes", ""),
    col("vendor", ""),
];

const INTERFACES: &[Column] = &[
    col("hostid", "0"),
    col("type", "1"),
    col("main", "1"),
    col("useip", "1"),
    col("ip", ""),
    col("dns", ""),
    col("port", "10050"),
    col("available", "0"),
    col("error", ""),
    col("errors_from", "0"),
    col("disable_until", "0"),
];

const INTERFACE_SNMP: &[Column] = &[
    col("version", "2"),
    col("bulk", "1"),
    col("max_repetitions", "10"),
    col("community", ""),
    col("securityname", ""),
    col("securitylevel", "0"),
    col("authpassphrase", ""),
    col("privpassphrase", ""),
    col("authprotocol", "0"),
    col("privprotocol", "0"),
    col("contextname", ""),
];

const ITEMS: &[Column] = &[
    col("hostid", "0"),
    col("interfaceid", "0"),
    col("key_", ""),
    col("type", "0"),
    col("value_type", "3"),
    col("status", "0"),
    col("state", "0"),
    col("error", ""),
    col("delay", "1m"),
    col("timeout", ""),
    col("flags", "0"),
    col("master_itemid", "0"),
    col("snmp_oid", ""),
    col("ipmi_sensor", ""),
    col("trapper_hosts", ""),
    col("username", ""),
    col("password", ""),
    col("params", ""),
    col("authtype", "0"),
    col("publickey", ""),
    col("privatekey", ""),
    col("jmx_endpoint", ""),
    col("url", ""),
    col("query_fields", ""),
    col("posts", ""),
    col("status_codes", "200"),
    col("http_proxy", ""),
    col("headers", ""),
    col("ssl_cert_file", ""),
    col("ssl_key_file", ""),
    col("ssl_key_password", ""),
    col("follow_redirects", "1"),
    col("post_type", "0"),
    col("retrieve_mode", "0"),
    col("request_method", "0"),
    col("output_format", "0"),
    col("verify_peer", "0"),
    col("verify_host", "0"),
    col("allow_traps", "0"),
];

const TRIGGERS: &[Column] = &[
    col("description", ""),
    col("expression", ""),
    col("recovery_expression", ""),
    col("error", ""),
    col("opdata", ""),
    col("event_name", ""),
    col("correlation_tag", ""),
    col("value", "0"),
    col("state", "0"),
    col("status", "0"),
    col("priority", "0"),
    col("recovery_mode", "0"),
    col("correlation_mode", "0"),
    col("lastchange", "0"),
];

const DCHECKS: &[Column] = &[
    col("druleid", "0"),
    col("type", "0"),
    col("key_", ""),
    col("ports", ""),
    col("snmp_community", ""),
    col("snmpv3_securityname", ""),
    col("snmpv3_securitylevel", "0"),
    col("snmpv3_authpassphrase", ""),
    col("snmpv3_privpassphrase", ""),
    col("snmpv3_contextname", ""),
    col("uniq", "0"),
    col("host_source", "1"),
    col("name_source", "0"),
    col("allow_redirect", "0"),
];

const HTTPSTEPS: &[Column] = &[
    col("httptestid", "0"),
    col("name", ""),
    col("no", "0"),
    col("url", ""),
    col("timeout", "15s"),
    col("posts", ""),
    col("required", ""),
    col("status_codes", ""),
    col("follow_redirects", "1"),
    col("retrieve_mode", "0"),
    col("post_type", "0"),
];

const PROXIES: &[Column] = &[
    col("name", ""),
    col("operating_mode", "0"),
    col("address", "127.0.0.1"),
    col("port", "10051"),
    col("allowed_addresses", ""),
    col("tls_connect", "1"),
    col("tls_accept", "1"),
    col("tls_issuer", ""),
    col("tls_subject", ""),
    col("tls_psk_identity", ""),
    col("tls_psk", ""),
    col("proxy_groupid", "0"),
    col("lastaccess", "0"),
    col("version", "0"),
];

const AUTOREG_PSK: &[Column] = &[
    col("tls_psk_identity", ""),
    col("tls_psk", ""),
];

const HOST_GROUPS: &[Column] = &[
    col("name", ""),
];

const HOSTS_GROUPS: &[Column] = &[
    col("hostid", "0"),
    col("groupid", "0"),
];

const HOST_TAGS: &[Column] = &[
    col("hostid", "0"),
    col("tag", ""),
    col("value", ""),
];

const GLOBAL_MACROS: &[Column] = &[
    col("macro", ""),
    col("value", ""),
    col("type", "0"),
];

const HOST_MACROS: &[Column] = &[
    col("hostid", "0"),
    col("macro", ""),
    col("value", ""),
    col("type", "0"),
];

const ITEM_DISCOVERY: &[Column] = &[
    col("itemid", "0"),
    col("parent_itemid", "0"),
];

const ITEM_PREPROC: &[Column] = &[
    col("itemid", "0"),
    col("step", "0"),
    col("type", "0"),
    col("params", ""),
    col("error_handler", "0"),
    col("error_handler_params", ""),
];

const ITEM_PARAMETERS: &[Column] = &[
    col("itemid", "0"),
    col("name", ""),
    col("value", ""),
];

const ITEM_TAGS: &[Column] = &[
    col("itemid", "0"),
    col("tag", ""),
    col("value", ""),
];

const TRIGGER_DEPENDS: &[Column] = &[
    col("triggerid_down", "0"),
    col("triggerid_up", "0"),
];

const FUNCTIONS: &[Column] = &[
    col("itemid", "0"),
    col("triggerid", "0"),
    col("name", ""),
    col("parameter", ""),
];

const TRIGGER_TAGS: &[Column] = &[
    col("triggerid", "0"),
    col("tag", ""),
    col("value", ""),
];

const CORRELATIONS: &[Column] = &[
    col("name", ""),
    col("evaltype", "0"),
    col("formula", ""),
    col("status", "0"),
];

const DRULES: &[Column] = &[
    col("proxyid", "0"),
    col("name", ""),
    col("iprange", ""),
    col("delay", "1h"),
    col("status", "0"),
    col("concurrency_max", "0"),
];

const HTTP_TESTS: &[Column] = &[
    col("hostid", "0"),
    col("name", ""),
    col("delay", "1m"),
    col("agent", ""),
    col("status", "0"),
    col("retries", "1"),
];

const PROXY_GROUPS: &[Column] = &[
    col("name", ""),
    col("failover_delay", "1m"),
    col("min_online", "1"),
];

const HOST_PROXY: &[Column] = &[
    col("hostid", "0"),
    col("proxyid", "0"),
    col("revision", "0"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique_and_resolvable() {
        let names: HashSet<_> = TableKind::ALL.iter().map(|kind| kind.name()).collect();
        assert_eq!(names.len(), TableKind::ALL.len());
        for kind in TableKind::ALL {
            assert_eq!(TableKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn columns_are_unique_per_table() {
        for kind in TableKind::ALL {
            let columns: HashSet<_> = kind.columns().iter().map(|column| column.name).collect();
            assert_eq!(columns.len(), kind.columns().len(), "{}", kind.name());
            assert!(!columns.contains(kind.id_column()), "{}", kind.name());
        }
    }

    #[test]
    fn order_follows_dependencies() {
        let position = |kind| TableKind::ALL.iter().position(|k| *k == kind).unwrap();
        assert!(position(TableKind::Hosts) < position(TableKind::Items));
        assert!(position(TableKind::Items) < position(TableKind::Functions));
        assert!(position(TableKind::Triggers) < position(TableKind::TriggerDepends));
        assert!(position(TableKind::Proxies) < position(TableKind::HostProxy));
    }
}
