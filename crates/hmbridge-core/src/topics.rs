//! Bus topic layout
//!
//! Every topic starts with the configured gateway name. These helpers keep
//! the exact topic strings in one place.

/// Verbs the gateway subscribes to under `{name}/`
pub const COMMAND_VERBS: [&str; 6] = ["set", "param", "paramset", "rega", "rpc", "command"];

/// Suffix of the delayed publish sent once a moving channel settles
pub const NOTWORKING_SUFFIX: &str = "_NOTWORKING";

/// Subscription filters for all command verbs
///
/// ```
/// # use hmbridge_core::topics::subscription_filters;
/// let filters = subscription_filters("hm");
/// assert_eq!(filters[0], "hm/set/#");
/// assert_eq!(filters.len(), 6);
/// ```
pub fn subscription_filters(name: &str) -> Vec<String> {
    COMMAND_VERBS
        .iter()
        .map(|verb| format!("{}/{}/#", name, verb))
        .collect()
}

/// `{name}/connected`
pub fn connected_topic(name: &str) -> String {
    format!("{}/connected", name)
}

/// `{name}/status/<displayName>/<datapoint>`
///
/// ```
/// # use hmbridge_core::topics::{notworking_topic, status_topic};
/// let topic = status_topic("hm", "Kitchen Blind", "LEVEL");
/// assert_eq!(topic, "hm/status/Kitchen Blind/LEVEL");
/// assert_eq!(notworking_topic(&topic), "hm/status/Kitchen Blind/LEVEL_NOTWORKING");
/// ```
pub fn status_topic(name: &str, display_name: &str, datapoint: &str) -> String {
    format!("{}/status/{}/{}", name, display_name, datapoint)
}

pub fn notworking_topic(status_topic: &str) -> String {
    format!("{}{}", status_topic, NOTWORKING_SUFFIX)
}

/// `{name}/response/<callId>`
pub fn response_topic(name: &str, call_id: &str) -> String {
    format!("{}/response/{}", name, call_id)
}

/// `db/extend/{name}/<address>`, used for metadata publishing
pub fn metadata_topic(name: &str, address: &str) -> String {
    format!("db/extend/{}/{}", name, address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_cover_all_verbs() {
        assert_eq!(
            subscription_filters("ccu"),
            vec![
                "ccu/set/#",
                "ccu/param/#",
                "ccu/paramset/#",
                "ccu/rega/#",
                "ccu/rpc/#",
                "ccu/command/#"
            ]
        );
    }

    #[test]
    fn response_and_connected() {
        assert_eq!(response_topic("hm", "42"), "hm/response/42");
        assert_eq!(connected_topic("hm"), "hm/connected");
        assert_eq!(metadata_topic("hm", "ABC:1"), "db/extend/hm/ABC:1");
    }
}
