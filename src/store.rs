//! Persistence of customers, orders and per-date RFM / cluster snapshots.
//!
//! Snapshot rows are keyed by `(customer_id, calc_date)`. Each `replace_*`
//! call deletes every row of one calc_date and writes the new rows as a
//! single transaction: either all of it lands or none of it does.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDateTime;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::data::{CentroidInfo, ClusterAssignment, Customer, Order, OrderStatus, RfmFeature};
use crate::segment::Segment;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid decimal: {0}")]
    Decimal(#[from] rust_decimal::Error),
    #[error("integrity violation: {0}")]
    Integrity(String),
}

/// Storage collaborator used by the pipeline and the query surface
pub trait SnapshotStore {
    /// Insert or update customers by id. Absent optional fields keep their stored value.
    fn upsert_customers(&mut self, customers: &[Customer]) -> Result<usize, StoreError>;
    /// Insert or overwrite orders by id
    fn upsert_orders(&mut self, orders: &[Order]) -> Result<usize, StoreError>;
    fn list_customers(&self) -> Result<Vec<Customer>, StoreError>;
    fn list_orders(&self) -> Result<Vec<Order>, StoreError>;
    fn customer(&self, customer_id: &str) -> Result<Option<Customer>, StoreError>;

    /// Delete all RFM rows of `calc_date` and write `rows` in one transaction
    fn replace_rfm_features(
        &mut self,
        calc_date: NaiveDateTime,
        rows: &[RfmFeature],
    ) -> Result<usize, StoreError>;
    fn rfm_features(&self, calc_date: NaiveDateTime) -> Result<Vec<RfmFeature>, StoreError>;

    /// Delete all assignments of `calc_date` and write `rows` in one transaction.
    ///
    /// Every row must reference an RFM row with the same key.
    fn replace_cluster_assignments(
        &mut self,
        calc_date: NaiveDateTime,
        rows: &[ClusterAssignment],
    ) -> Result<usize, StoreError>;
    fn cluster_assignments(
        &self,
        calc_date: NaiveDateTime,
    ) -> Result<Vec<ClusterAssignment>, StoreError>;

    /// Most recent calc_date with cluster assignments
    fn latest_cluster_date(&self) -> Result<Option<NaiveDateTime>, StoreError>;
    /// Most recent calc_date with an RFM row for `customer_id`
    fn latest_rfm_date_for(&self, customer_id: &str) -> Result<Option<NaiveDateTime>, StoreError>;
}

/// Reject rows keyed to another date and duplicate customers within one snapshot
fn check_snapshot_keys<'a>(
    calc_date: NaiveDateTime,
    keys: impl Iterator<Item = (&'a str, NaiveDateTime)>,
) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for (customer_id, row_date) in keys {
        if row_date != calc_date {
            return Err(StoreError::Integrity(format!(
                "row for customer {} is keyed to {} instead of {}",
                customer_id, row_date, calc_date
            )));
        }
        if !seen.insert(customer_id) {
            return Err(StoreError::Integrity(format!(
                "duplicate row for customer {} at {}",
                customer_id, calc_date
            )));
        }
    }
    Ok(())
}

// =============================================================================
// In-memory store
// =============================================================================

/// Store backed by ordered maps, for tests and dry runs
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    customers: BTreeMap<String, Customer>,
    orders: BTreeMap<String, Order>,
    rfm: BTreeMap<NaiveDateTime, Vec<RfmFeature>>,
    clusters: BTreeMap<NaiveDateTime, Vec<ClusterAssignment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn upsert_customers(&mut self, customers: &[Customer]) -> Result<usize, StoreError> {
        for customer in customers {
            match self.customers.get_mut(&customer.customer_id) {
                Some(existing) => {
                    if customer.email.is_some() {
                        existing.email = customer.email.clone();
                    }
                    if customer.country.is_some() {
                        existing.country = customer.country.clone();
                    }
                    if customer.created_at.is_some() {
                        existing.created_at = customer.created_at;
                    }
                }
                None => {
                    self.customers
                        .insert(customer.customer_id.clone(), customer.clone());
                }
            }
        }
        Ok(customers.len())
    }

    fn upsert_orders(&mut self, orders: &[Order]) -> Result<usize, StoreError> {
        for order in orders {
            self.orders.insert(order.order_id.clone(), order.clone());
        }
        Ok(orders.len())
    }

    fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        Ok(self.customers.values().cloned().collect())
    }

    fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.orders.values().cloned().collect())
    }

    fn customer(&self, customer_id: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self.customers.get(customer_id).cloned())
    }

    fn replace_rfm_features(
        &mut self,
        calc_date: NaiveDateTime,
        rows: &[RfmFeature],
    ) -> Result<usize, StoreError> {
        check_snapshot_keys(
            calc_date,
            rows.iter().map(|r| (r.customer_id.as_str(), r.calc_date)),
        )?;

        if rows.is_empty() {
            self.rfm.remove(&calc_date);
        } else {
            self.rfm.insert(calc_date, rows.to_vec());
        }
        Ok(rows.len())
    }

    fn rfm_features(&self, calc_date: NaiveDateTime) -> Result<Vec<RfmFeature>, StoreError> {
        Ok(self.rfm.get(&calc_date).cloned().unwrap_or_default())
    }

    fn replace_cluster_assignments(
        &mut self,
        calc_date: NaiveDateTime,
        rows: &[ClusterAssignment],
    ) -> Result<usize, StoreError> {
        check_snapshot_keys(
            calc_date,
            rows.iter().map(|r| (r.customer_id.as_str(), r.calc_date)),
        )?;

        let known: HashSet<&str> = self
            .rfm
            .get(&calc_date)
            .map(|rows| rows.iter().map(|r| r.customer_id.as_str()).collect())
            .unwrap_or_default();
        if let Some(orphan) = rows.iter().find(|r| !known.contains(r.customer_id.as_str())) {
            return Err(StoreError::Integrity(format!(
                "no RFM row for customer {} at {}",
                orphan.customer_id, calc_date
            )));
        }

        if rows.is_empty() {
            self.clusters.remove(&calc_date);
        } else {
            self.clusters.insert(calc_date, rows.to_vec());
        }
        Ok(rows.len())
    }

    fn cluster_assignments(
        &self,
        calc_date: NaiveDateTime,
    ) -> Result<Vec<ClusterAssignment>, StoreError> {
        Ok(self.clusters.get(&calc_date).cloned().unwrap_or_default())
    }

    fn latest_cluster_date(&self) -> Result<Option<NaiveDateTime>, StoreError> {
        Ok(self.clusters.keys().next_back().copied())
    }

    fn latest_rfm_date_for(&self, customer_id: &str) -> Result<Option<NaiveDateTime>, StoreError> {
        Ok(self
            .rfm
            .iter()
            .rev()
            .find(|(_, rows)| rows.iter().any(|r| r.customer_id == customer_id))
            .map(|(date, _)| *date))
    }
}

// =============================================================================
// SQLite store
// =============================================================================

/// Store backed by a SQLite database file
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             PRAGMA busy_timeout=5000;",
        )?;
        info!("Opened snapshot store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::create_tables(&conn)?;
        Ok(Self { conn })
    }

    fn create_tables(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS customers (\
               customer_id TEXT PRIMARY KEY,\
               email TEXT,\
               country TEXT,\
               created_at TEXT\
             );\
             CREATE TABLE IF NOT EXISTS orders (\
               order_id TEXT PRIMARY KEY,\
               customer_id TEXT NOT NULL,\
               order_date TEXT NOT NULL,\
               order_amount TEXT NOT NULL,\
               currency TEXT NOT NULL DEFAULT 'EUR',\
               status TEXT NOT NULL\
             );\
             CREATE TABLE IF NOT EXISTS rfm_features (\
               customer_id TEXT NOT NULL,\
               calc_date TEXT NOT NULL,\
               recency_days INTEGER NOT NULL,\
               frequency INTEGER NOT NULL,\
               monetary TEXT NOT NULL,\
               PRIMARY KEY (customer_id, calc_date)\
             );\
             CREATE TABLE IF NOT EXISTS customer_clusters (\
               customer_id TEXT NOT NULL,\
               calc_date TEXT NOT NULL,\
               cluster_id INTEGER NOT NULL,\
               segment_name TEXT NOT NULL,\
               cluster_score TEXT,\
               PRIMARY KEY (customer_id, calc_date)\
             );\
             CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id);\
             CREATE INDEX IF NOT EXISTS idx_rfm_calc_date ON rfm_features(calc_date);\
             CREATE INDEX IF NOT EXISTS idx_clusters_calc_date ON customer_clusters(calc_date);",
        )?;
        Ok(())
    }
}

impl SnapshotStore for SqliteStore {
    fn upsert_customers(&mut self, customers: &[Customer]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO customers (customer_id, email, country, created_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(customer_id) DO UPDATE SET \
                   email = COALESCE(excluded.email, customers.email), \
                   country = COALESCE(excluded.country, customers.country), \
                   created_at = COALESCE(excluded.created_at, customers.created_at)",
            )?;
            for c in customers {
                stmt.execute(params![c.customer_id, c.email, c.country, c.created_at])?;
            }
        }
        tx.commit()?;
        Ok(customers.len())
    }

    fn upsert_orders(&mut self, orders: &[Order]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO orders \
                 (order_id, customer_id, order_date, order_amount, currency, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for o in orders {
                stmt.execute(params![
                    o.order_id,
                    o.customer_id,
                    o.order_date,
                    o.amount.to_string(),
                    o.currency,
                    o.status.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(orders.len())
    }

    fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, email, country, created_at FROM customers ORDER BY customer_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Customer {
                customer_id: row.get(0)?,
                email: row.get(1)?,
                country: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT order_id, customer_id, order_date, order_amount, currency, status \
             FROM orders ORDER BY order_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, NaiveDateTime>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut orders = Vec::new();
        for row in rows {
            let (order_id, customer_id, order_date, amount, currency, status) = row?;
            orders.push(Order {
                order_id,
                customer_id,
                order_date,
                amount: Decimal::from_str(&amount)?,
                currency,
                status: OrderStatus::from(status),
            });
        }
        Ok(orders)
    }

    fn customer(&self, customer_id: &str) -> Result<Option<Customer>, StoreError> {
        let customer = self
            .conn
            .query_row(
                "SELECT customer_id, email, country, created_at FROM customers WHERE customer_id = ?1",
                params![customer_id],
                |row| {
                    Ok(Customer {
                        customer_id: row.get(0)?,
                        email: row.get(1)?,
                        country: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(customer)
    }

    fn replace_rfm_features(
        &mut self,
        calc_date: NaiveDateTime,
        rows: &[RfmFeature],
    ) -> Result<usize, StoreError> {
        check_snapshot_keys(
            calc_date,
            rows.iter().map(|r| (r.customer_id.as_str(), r.calc_date)),
        )?;

        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM rfm_features WHERE calc_date = ?1",
            params![calc_date],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO rfm_features (customer_id, calc_date, recency_days, frequency, monetary) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in rows {
                stmt.execute(params![
                    r.customer_id,
                    r.calc_date,
                    r.recency_days,
                    r.frequency,
                    r.monetary.to_string(),
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            "Replaced {} RFM rows with {} for {}",
            deleted,
            rows.len(),
            calc_date
        );
        Ok(rows.len())
    }

    fn rfm_features(&self, calc_date: NaiveDateTime) -> Result<Vec<RfmFeature>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, calc_date, recency_days, frequency, monetary \
             FROM rfm_features WHERE calc_date = ?1 ORDER BY customer_id",
        )?;
        let rows = stmt.query_map(params![calc_date], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, NaiveDateTime>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut features = Vec::new();
        for row in rows {
            let (customer_id, calc_date, recency_days, frequency, monetary) = row?;
            features.push(RfmFeature {
                customer_id,
                calc_date,
                recency_days,
                frequency,
                monetary: Decimal::from_str(&monetary)?,
            });
        }
        Ok(features)
    }

    fn replace_cluster_assignments(
        &mut self,
        calc_date: NaiveDateTime,
        rows: &[ClusterAssignment],
    ) -> Result<usize, StoreError> {
        check_snapshot_keys(
            calc_date,
            rows.iter().map(|r| (r.customer_id.as_str(), r.calc_date)),
        )?;

        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM customer_clusters WHERE calc_date = ?1",
            params![calc_date],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO customer_clusters \
                 (customer_id, calc_date, cluster_id, segment_name, cluster_score) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in rows {
                let score = r.centroid.as_ref().map(serde_json::to_string).transpose()?;
                stmt.execute(params![
                    r.customer_id,
                    r.calc_date,
                    r.cluster_id as i64,
                    r.segment.as_str(),
                    score,
                ])?;
            }
        }

        let orphan: Option<String> = tx
            .query_row(
                "SELECT c.customer_id FROM customer_clusters c \
                 LEFT JOIN rfm_features r \
                   ON r.customer_id = c.customer_id AND r.calc_date = c.calc_date \
                 WHERE c.calc_date = ?1 AND r.customer_id IS NULL LIMIT 1",
                params![calc_date],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(customer_id) = orphan {
            // Dropping the transaction rolls it back
            return Err(StoreError::Integrity(format!(
                "no RFM row for customer {} at {}",
                customer_id, calc_date
            )));
        }
        tx.commit()?;

        debug!(
            "Replaced {} cluster assignments with {} for {}",
            deleted,
            rows.len(),
            calc_date
        );
        Ok(rows.len())
    }

    fn cluster_assignments(
        &self,
        calc_date: NaiveDateTime,
    ) -> Result<Vec<ClusterAssignment>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, calc_date, cluster_id, segment_name, cluster_score \
             FROM customer_clusters WHERE calc_date = ?1 ORDER BY customer_id",
        )?;
        let rows = stmt.query_map(params![calc_date], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, NaiveDateTime>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut assignments = Vec::new();
        for row in rows {
            let (customer_id, calc_date, cluster_id, segment_name, score) = row?;
            let cluster_id = usize::try_from(cluster_id).map_err(|_| {
                StoreError::Integrity(format!("negative cluster id for customer {}", customer_id))
            })?;
            let segment = Segment::from_str(&segment_name).map_err(StoreError::Integrity)?;
            let centroid = score
                .as_deref()
                .map(serde_json::from_str::<CentroidInfo>)
                .transpose()?;
            assignments.push(ClusterAssignment {
                customer_id,
                calc_date,
                cluster_id,
                segment,
                centroid,
            });
        }
        Ok(assignments)
    }

    fn latest_cluster_date(&self) -> Result<Option<NaiveDateTime>, StoreError> {
        let latest = self.conn.query_row(
            "SELECT MAX(calc_date) FROM customer_clusters",
            [],
            |row| row.get::<_, Option<NaiveDateTime>>(0),
        )?;
        Ok(latest)
    }

    fn latest_rfm_date_for(&self, customer_id: &str) -> Result<Option<NaiveDateTime>, StoreError> {
        let latest = self.conn.query_row(
            "SELECT MAX(calc_date) FROM rfm_features WHERE customer_id = ?1",
            params![customer_id],
            |row| row.get::<_, Option<NaiveDateTime>>(0),
        )?;
        Ok(latest)
    }
}
