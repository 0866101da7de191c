//! CSV ingestion of customers and orders using Polars

use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, warn};
use polars::prelude::*;
use rust_decimal::Decimal;

use crate::data::{parse_timestamp, Customer, Order, OrderStatus};
use crate::error::SegmentationError;

const CUSTOMERS_FILE: &str = "customers.csv";
const ORDERS_FILE: &str = "orders.csv";
const DEFAULT_CURRENCY: &str = "EUR";

/// Upstream source of customer and order records
pub trait OrderSource {
    fn load_customers(&self) -> Result<Vec<Customer>, SegmentationError>;
    fn load_orders(&self) -> Result<Vec<Order>, SegmentationError>;
}

/// Reads `customers.csv` and `orders.csv`
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub customers_path: PathBuf,
    pub orders_path: PathBuf,
}

impl CsvSource {
    pub fn from_dir(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            customers_path: dir.join(CUSTOMERS_FILE),
            orders_path: dir.join(ORDERS_FILE),
        }
    }
}

impl OrderSource for CsvSource {
    fn load_customers(&self) -> Result<Vec<Customer>, SegmentationError> {
        let df = read_csv(&self.customers_path)?;
        let table = StringTable::new(&df, &self.customers_path);

        let ids = table.required("customer_id")?;
        let emails = table.optional("email");
        let countries = table.optional("country");
        let created = table.optional("created_at");

        let mut customers = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            let Some(customer_id) = non_blank(id.as_deref()) else {
                continue;
            };
            customers.push(Customer {
                customer_id: customer_id.to_string(),
                email: cell(&emails, i).map(str::to_string),
                country: cell(&countries, i).map(str::to_string),
                created_at: cell(&created, i).and_then(parse_timestamp),
            });
        }

        debug!(
            "Loaded {} customers from {}",
            customers.len(),
            self.customers_path.display()
        );
        Ok(customers)
    }

    fn load_orders(&self) -> Result<Vec<Order>, SegmentationError> {
        let df = read_csv(&self.orders_path)?;
        let table = StringTable::new(&df, &self.orders_path);

        let order_ids = table.required("order_id")?;
        let customer_ids = table.required("customer_id")?;
        let dates = table.required("order_date")?;
        let amounts = table.required("order_amount")?;
        let currencies = table.optional("currency");
        let statuses = table.optional("status");

        let mut orders = Vec::with_capacity(order_ids.len());
        for (i, id) in order_ids.iter().enumerate() {
            let Some(order_id) = non_blank(id.as_deref()) else {
                continue;
            };

            let customer_id = value(&customer_ids, i).ok_or_else(|| {
                SegmentationError::DataIntegrity(format!("missing customer_id for order {}", order_id))
            })?;

            let order_date = value(&dates, i)
                .and_then(parse_timestamp)
                .ok_or_else(|| {
                    SegmentationError::DataIntegrity(format!("invalid order_date for order {}", order_id))
                })?;

            let raw_amount = value(&amounts, i).unwrap_or_default();
            let amount = Decimal::from_str(raw_amount)
                .or_else(|_| Decimal::from_scientific(raw_amount))
                .map_err(|_| {
                    SegmentationError::DataIntegrity(format!(
                        "invalid order_amount '{}' for order {}",
                        raw_amount, order_id
                    ))
                })?;
            if amount.is_sign_negative() && !amount.is_zero() {
                return Err(SegmentationError::DataIntegrity(format!(
                    "negative order_amount {} for order {}",
                    amount, order_id
                )));
            }

            orders.push(Order {
                order_id: order_id.to_string(),
                customer_id: customer_id.to_string(),
                order_date,
                amount,
                currency: cell(&currencies, i).unwrap_or(DEFAULT_CURRENCY).to_string(),
                status: cell(&statuses, i)
                    .map(OrderStatus::from)
                    .unwrap_or(OrderStatus::Completed),
            });
        }

        debug!("Loaded {} orders from {}", orders.len(), self.orders_path.display());
        Ok(orders)
    }
}

/// Read a CSV with every column typed as string
fn read_csv(path: &Path) -> Result<DataFrame, SegmentationError> {
    if !path.exists() {
        return Err(SegmentationError::DataIntegrity(format!(
            "CSV not found: {}",
            path.display()
        )));
    }

    LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()
        .and_then(|lf| lf.collect())
        .map_err(|e| {
            SegmentationError::DataIntegrity(format!("failed to read {}: {}", path.display(), e))
        })
}

/// Column accessor over a string-typed frame
struct StringTable<'a> {
    df: &'a DataFrame,
    path: &'a Path,
}

impl<'a> StringTable<'a> {
    fn new(df: &'a DataFrame, path: &'a Path) -> Self {
        Self { df, path }
    }

    fn required(&self, name: &str) -> Result<Vec<Option<String>>, SegmentationError> {
        self.column(name).ok_or_else(|| {
            SegmentationError::DataIntegrity(format!(
                "{} must contain a '{}' column",
                self.path.display(),
                name
            ))
        })
    }

    fn optional(&self, name: &str) -> Option<Vec<Option<String>>> {
        self.column(name)
    }

    fn column(&self, name: &str) -> Option<Vec<Option<String>>> {
        let series = self.df.column(name).ok()?;
        match series.str() {
            Ok(values) => Some(values.into_iter().map(|v| v.map(str::to_string)).collect()),
            Err(e) => {
                warn!("Column '{}' in {} is not text: {}", name, self.path.display(), e);
                None
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn value(column: &[Option<String>], row: usize) -> Option<&str> {
    column.get(row).and_then(|v| non_blank(v.as_deref()))
}

fn cell(column: &Option<Vec<Option<String>>>, row: usize) -> Option<&str> {
    column.as_deref().and_then(|values| value(values, row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(name), contents).unwrap();
    }

    #[test]
    fn test_load_customers() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            CUSTOMERS_FILE,
            "customer_id,email,country,created_at\n\
             C001,one@test.com,US,2023-05-01\n\
             C002,,UK,\n\
             ,orphan@test.com,CA,\n",
        );

        let customers = CsvSource::from_dir(dir.path()).load_customers().unwrap();
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].customer_id, "C001");
        assert_eq!(customers[0].email.as_deref(), Some("one@test.com"));
        assert!(customers[0].created_at.is_some());
        assert_eq!(customers[1].email, None);
        assert_eq!(customers[1].country.as_deref(), Some("UK"));
    }

    #[test]
    fn test_load_orders_with_defaults() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            ORDERS_FILE,
            "order_id,customer_id,order_date,order_amount\n\
             O001,C001,2024-01-10,100.00\n\
             O002,C001,2024-01-05 12:30:00,150.5\n",
        );

        let orders = CsvSource::from_dir(dir.path()).load_orders().unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].currency, "EUR");
        assert_eq!(orders[0].status, OrderStatus::Completed);
        assert_eq!(orders[0].amount, Decimal::from_str("100.00").unwrap());
        assert_eq!(orders[1].amount, Decimal::from_str("150.50").unwrap());
    }

    #[test]
    fn test_load_orders_with_status() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            ORDERS_FILE,
            "order_id,customer_id,order_date,order_amount,currency,status\n\
             O001,C001,2024-01-10,100.00,USD,cancelled\n",
        );

        let orders = CsvSource::from_dir(dir.path()).load_orders().unwrap();
        assert_eq!(orders[0].currency, "USD");
        assert_eq!(orders[0].status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_invalid_orders_are_integrity_errors() {
        let dir = TempDir::new().unwrap();
        let source = CsvSource::from_dir(dir.path());

        write(&dir, ORDERS_FILE, "order_id,customer_id,order_date\nO001,C001,2024-01-10\n");
        assert!(matches!(source.load_orders(), Err(SegmentationError::DataIntegrity(_))));

        write(
            &dir,
            ORDERS_FILE,
            "order_id,customer_id,order_date,order_amount\nO001,C001,not a date,1.00\n",
        );
        assert!(matches!(source.load_orders(), Err(SegmentationError::DataIntegrity(_))));

        write(
            &dir,
            ORDERS_FILE,
            "order_id,customer_id,order_date,order_amount\nO001,C001,2024-01-10,-5.00\n",
        );
        assert!(matches!(source.load_orders(), Err(SegmentationError::DataIntegrity(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = CsvSource::from_dir(dir.path()).load_customers();
        assert!(matches!(result, Err(SegmentationError::DataIntegrity(_))));
    }
}
