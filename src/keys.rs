//! Backing-store key schema
//!
//! Every key the protocol touches is derived here and nowhere else.
//! Derivation is literal token replacement of the `{connection}` and
//! `{queue}` placeholders in the template constants.

/// Set of all known connection names
pub const CONNECTIONS_KEY: &str = "rmq::connections";

/// Set of all queues ever opened
pub const QUEUES_KEY: &str = "rmq::queues";

/// Liveness token; expires after {connection} died
const CONNECTION_HEARTBEAT_TEMPLATE: &str = "rmq::connection::{connection}::heartbeat";

/// Set of queues consumers of {connection} are consuming
const CONNECTION_QUEUES_TEMPLATE: &str = "rmq::connection::{connection}::queues";

/// Set of all consumers from {connection} consuming from {queue}
const CONNECTION_QUEUE_CONSUMERS_TEMPLATE: &str =
    "rmq::connection::{connection}::queue::{queue}::consumers";

/// List of deliveries consumers of {connection} are currently consuming
const CONNECTION_QUEUE_UNACKED_TEMPLATE: &str =
    "rmq::connection::{connection}::queue::{queue}::unacked";

/// List of deliveries in {queue} (right is first and oldest, left is last and youngest)
const QUEUE_READY_TEMPLATE: &str = "rmq::queue::{queue}::ready";

const PH_CONNECTION: &str = "{connection}";
const PH_QUEUE: &str = "{queue}";

/// Heartbeat key of a connection
pub fn connection_heartbeat(connection: &str) -> String {
    CONNECTION_HEARTBEAT_TEMPLATE.replacen(PH_CONNECTION, connection, 1)
}

/// Key to the set of queues a connection consumes
pub fn connection_queues(connection: &str) -> String {
    CONNECTION_QUEUES_TEMPLATE.replacen(PH_CONNECTION, connection, 1)
}

/// Key to the consumer-name set of a (connection, queue) pair
pub fn connection_queue_consumers(connection: &str, queue: &str) -> String {
    CONNECTION_QUEUE_CONSUMERS_TEMPLATE
        .replacen(PH_CONNECTION, connection, 1)
        .replacen(PH_QUEUE, queue, 1)
}

/// Key to the unacked list of a (connection, queue) pair
pub fn connection_queue_unacked(connection: &str, queue: &str) -> String {
    CONNECTION_QUEUE_UNACKED_TEMPLATE
        .replacen(PH_CONNECTION, connection, 1)
        .replacen(PH_QUEUE, queue, 1)
}

/// Key to the ready list of a queue
pub fn queue_ready(queue: &str) -> String {
    QUEUE_READY_TEMPLATE.replacen(PH_QUEUE, queue, 1)
}
