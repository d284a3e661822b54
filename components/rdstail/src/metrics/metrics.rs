// External crates
use lazy_static::lazy_static;
use prometheus::{Counter, register_counter};

lazy_static! {
    // ======== Remote API Metrics ========

    /// Log file listing calls, discovery tiers and rollover checks alike
    pub static ref LIST_CALLS_TOTAL: Counter = register_counter!(
        "rdstail_list_calls_total",
        "Number of remote log file listing calls issued"
    ).unwrap();

    pub static ref PORTIONS_READ_TOTAL: Counter = register_counter!(
        "rdstail_portions_read_total",
        "Number of log file portions downloaded"
    ).unwrap();

    pub static ref EMPTY_READS_TOTAL: Counter = register_counter!(
        "rdstail_empty_reads_total",
        "Number of polls that returned no new log data"
    ).unwrap();

    // ======== Tail Metrics ========

    pub static ref ROLLOVERS_TOTAL: Counter = register_counter!(
        "rdstail_rollovers_total",
        "Number of times the tail switched to a newer log file"
    ).unwrap();

    // ======== Delivery Metrics ========

    pub static ref DELIVERIES_TOTAL: Counter = register_counter!(
        "rdstail_deliveries_total",
        "Number of log portions delivered to the sink"
    ).unwrap();

    pub static ref DELIVERED_BYTES_TOTAL: Counter = register_counter!(
        "rdstail_delivered_bytes_total",
        "Bytes of log text delivered to the sink"
    ).unwrap();

    /// Failed network writes that were scheduled for another attempt
    pub static ref DELIVERY_RETRIES_TOTAL: Counter = register_counter!(
        "rdstail_delivery_retries_total",
        "Number of retried network sink writes"
    ).unwrap();
}
