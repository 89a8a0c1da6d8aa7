/// Counter for records accepted from the upstream stream
pub const RECORDS_CONSUMED: &str = "kafka_tail_records_consumed_total";

/// Counter for records written to the output, labelled by worker
pub const RECORDS_RENDERED: &str = "kafka_tail_records_rendered_total";

/// Counter for receive errors reported by the upstream stream
pub const RECEIVE_ERRORS: &str = "kafka_tail_receive_errors_total";

/// Counter for failed writes to the output
pub const WRITE_ERRORS: &str = "kafka_tail_write_errors_total";

/// Counter for payloads shown raw because pretty-printing could not parse them
pub const JSON_FALLBACKS: &str = "kafka_tail_json_fallbacks_total";
