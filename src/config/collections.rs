//! The collection set covered by backups
//!
//! Order matters on restore: the identity collection is always written
//! last, because access rules for the other collections are evaluated
//! against the accounts stored in it. [`restore_order`] is the single place
//! that ordering is decided.

/// Collection holding user accounts and their roles
pub const IDENTITY_COLLECTION: &str = "users";

/// Every collection backed up by default, in backup order
pub const DEFAULT_COLLECTIONS: &[&str] = &[
    "users",
    "obras",
    "clientes",
    "proveedores",
    "empleados",
    "nominas",
    "requisiciones",
    "ordenesCompra",
    "facturas",
    "pagos",
    "gastos",
    "inventario",
];

/// Default collection list as owned strings
pub fn default_collections() -> Vec<String> {
    DEFAULT_COLLECTIONS.iter().map(|c| c.to_string()).collect()
}

/// Order in which collections are restored: configured order with the
/// identity collection moved to the end
pub fn restore_order(collections: &[String], identity: &str) -> Vec<String> {
    let mut order: Vec<String> = collections
        .iter()
        .filter(|c| c.as_str() != identity)
        .cloned()
        .collect();
    if collections.iter().any(|c| c == identity) {
        order.push(identity.to_string());
    }
    order
}
