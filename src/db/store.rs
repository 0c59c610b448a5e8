//! Persistence for value types, values, devices and locations.
//!
//! One SQLite connection sits behind a mutex; the store is shared as
//! `Arc<ValueStore>` between the reader thread and whoever serves requests.
//! Multi-statement operations run inside an immediate transaction so the
//! unique index on `sensor_values` is the serialization point for writers.

use crate::db::error::StoreError;
use crate::db::models::{Device, DevicePatch, Location, NewDevice, NewLocation, NewValue, Value, ValueType};
use crate::schema;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{debug, info, warn};
use std::sync::{Mutex, MutexGuard};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Optional, AND-composed filters for [`ValueStore::query_values`].
/// `start` and `end` are inclusive and compare the stored signed time, so raw
/// device times at or above 2^63 sort before all others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueFilter {
    pub type_id: Option<i64>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub device_id: Option<i32>,
}

impl ValueFilter {
    pub fn new(type_id: Option<i64>, start: Option<i64>, end: Option<i64>) -> Self {
        ValueFilter {
            type_id,
            start,
            end,
            device_id: None,
        }
    }

    pub fn for_device(mut self, device_id: i32) -> Self {
        self.device_id = Some(device_id);
        self
    }
}

pub struct ValueStore {
    conn: Mutex<SqliteConnection>,
}

fn configure_connection(conn: &mut SqliteConnection) -> Result<(), StoreError> {
    diesel::sql_query("PRAGMA foreign_keys = ON").execute(conn)?;
    diesel::sql_query(format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS)).execute(conn)?;
    Ok(())
}

fn apply_database_migrations(conn: &mut SqliteConnection) -> Result<(), StoreError> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StoreError::Migration(e.to_string()))?;
    if applied.is_empty() {
        info!("Database schema is up to date; no migrations were applied");
    } else {
        let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
        info!("Applied {} database migration(s): {}", applied.len(), names);
    }
    Ok(())
}

impl ValueStore {
    /// Open (or create) the database at `database_url` and bring its schema up to date.
    pub fn open(database_url: &str) -> Result<Self, StoreError> {
        let mut conn = SqliteConnection::establish(database_url)?;
        configure_connection(&mut conn)?;
        apply_database_migrations(&mut conn)?;
        debug!("Store opened at {}", database_url);
        Ok(ValueStore { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, SqliteConnection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // ----- value types -----

    /// Create the value type `id` if missing, otherwise overwrite the fields
    /// given as non-empty strings. Missing fields become `TYPE_<id>` / `UNIT_<id>`.
    pub fn upsert_value_type(&self, id: i64, name: Option<&str>, unit: Option<&str>) -> Result<ValueType, StoreError> {
        let mut conn = self.conn()?;
        conn.immediate_transaction(|conn| upsert_value_type(conn, id, name, unit))
    }

    pub fn list_value_types(&self) -> Result<Vec<ValueType>, StoreError> {
        use schema::value_types::dsl as T;

        let mut conn = self.conn()?;
        Ok(T::value_types
            .select(ValueType::as_select())
            .order(T::id.asc())
            .load(&mut *conn)?)
    }

    pub fn get_value_type(&self, id: i64) -> Result<ValueType, StoreError> {
        use schema::value_types::dsl as T;

        let mut conn = self.conn()?;
        T::value_types
            .find(id)
            .select(ValueType::as_select())
            .first(&mut *conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found("value type", id))
    }

    // ----- values -----

    /// Resolve the value type and insert one value in a single transaction.
    ///
    /// A second insert of the same `(time, type_id, device_id)` fails with
    /// [`StoreError::ConstraintViolation`] and leaves the first row unchanged.
    pub fn insert_value(&self, time: i64, type_id: i64, value: f64, device_id: Option<i32>) -> Result<Value, StoreError> {
        use schema::sensor_values::dsl as V;

        let mut conn = self.conn()?;
        conn.immediate_transaction(|conn| {
            upsert_value_type(conn, type_id, None, None)?;
            let row = NewValue {
                time,
                value,
                value_type_id: type_id,
                device_id,
            };
            let inserted = diesel::insert_into(V::sensor_values)
                .values(&row)
                .returning(Value::as_returning())
                .get_result(conn)?;
            Ok::<_, StoreError>(inserted)
        })
        .inspect_err(|e| debug!("Insert of value (time={}, type={}, device={:?}) failed: {}", time, type_id, device_id, e))
    }

    /// Values matching every set filter, ordered by ascending time.
    pub fn query_values(&self, filter: &ValueFilter) -> Result<Vec<Value>, StoreError> {
        let mut conn = self.conn()?;
        load_values(&mut conn, filter)
    }

    pub fn values_for_device(&self, device_id: i32) -> Result<Vec<Value>, StoreError> {
        let mut conn = self.conn()?;
        require_device(&mut conn, device_id)?;
        load_values(&mut conn, &ValueFilter::default().for_device(device_id))
    }

    pub fn count_values(&self) -> Result<i64, StoreError> {
        use schema::sensor_values::dsl as V;

        let mut conn = self.conn()?;
        Ok(V::sensor_values.count().get_result(&mut *conn)?)
    }

    // ----- devices -----

    pub fn create_device(
        &self,
        name: &str,
        description: Option<&str>,
        location_id: Option<i32>,
    ) -> Result<Device, StoreError> {
        let mut conn = self.conn()?;
        conn.immediate_transaction(|conn| insert_device(conn, name, description, location_id))
            .inspect_err(|e| warn!("Creating device {:?} failed: {}", name, e))
    }

    /// Patch a device; `None` fields keep their current value.
    pub fn update_device(&self, id: i32, name: Option<&str>, description: Option<&str>) -> Result<Device, StoreError> {
        use schema::devices::dsl as D;

        let patch = DevicePatch {
            name,
            description,
            updated_at: Some(Utc::now().naive_utc()),
        };
        let mut conn = self.conn()?;
        conn.immediate_transaction(|conn| {
            diesel::update(D::devices.find(id))
                .set(&patch)
                .returning(Device::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("device", id))
        })
        .inspect_err(|e| warn!("Updating device {} failed: {}", id, e))
    }

    /// Delete a device together with its values. Returns the number of values removed.
    pub fn delete_device(&self, id: i32) -> Result<usize, StoreError> {
        use schema::devices::dsl as D;
        use schema::sensor_values::dsl as V;

        let mut conn = self.conn()?;
        let removed = conn.immediate_transaction(|conn| {
            require_device(conn, id)?;
            let removed = diesel::delete(V::sensor_values.filter(V::device_id.eq(id))).execute(conn)?;
            diesel::delete(D::devices.find(id)).execute(conn)?;
            Ok::<_, StoreError>(removed)
        })?;
        info!("Deleted device {} ({} value(s) removed)", id, removed);
        Ok(removed)
    }

    pub fn get_device(&self, id: i32) -> Result<Device, StoreError> {
        let mut conn = self.conn()?;
        require_device(&mut conn, id)
    }

    pub fn list_devices(&self) -> Result<Vec<Device>, StoreError> {
        use schema::devices::dsl as D;

        let mut conn = self.conn()?;
        Ok(D::devices
            .select(Device::as_select())
            .order(D::id.asc())
            .load(&mut *conn)?)
    }

    pub fn list_device_ids(&self) -> Result<Vec<i32>, StoreError> {
        use schema::devices::dsl as D;

        let mut conn = self.conn()?;
        Ok(D::devices.select(D::id).order(D::id.asc()).load(&mut *conn)?)
    }

    /// Look a device up by name, creating it (and its location) when absent.
    pub fn ensure_device(
        &self,
        name: &str,
        description: Option<&str>,
        location_name: Option<&str>,
    ) -> Result<Device, StoreError> {
        use schema::devices::dsl as D;

        let mut conn = self.conn()?;
        conn.immediate_transaction(|conn| {
            let existing = D::devices
                .filter(D::name.eq(name))
                .order(D::id.asc())
                .select(Device::as_select())
                .first(conn)
                .optional()?;
            if let Some(device) = existing {
                return Ok(device);
            }
            let location_id = location_name
                .map(|n| ensure_location(conn, n))
                .transpose()?
                .map(|l| l.id);
            insert_device(conn, name, description, location_id)
        })
    }

    // ----- locations -----

    pub fn create_location(&self, name: &str) -> Result<Location, StoreError> {
        use schema::locations::dsl as L;

        let mut conn = self.conn()?;
        conn.immediate_transaction(|conn| {
            Ok::<_, StoreError>(
                diesel::insert_into(L::locations)
                    .values(&NewLocation { name })
                    .returning(Location::as_returning())
                    .get_result(conn)?,
            )
        })
    }

    pub fn get_location(&self, id: i32) -> Result<Location, StoreError> {
        use schema::locations::dsl as L;

        let mut conn = self.conn()?;
        L::locations
            .find(id)
            .select(Location::as_select())
            .first(&mut *conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found("location", id))
    }

    pub fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        use schema::locations::dsl as L;

        let mut conn = self.conn()?;
        Ok(L::locations
            .select(Location::as_select())
            .order(L::id.asc())
            .load(&mut *conn)?)
    }

    pub fn list_location_ids(&self) -> Result<Vec<i32>, StoreError> {
        use schema::locations::dsl as L;

        let mut conn = self.conn()?;
        Ok(L::locations.select(L::id).order(L::id.asc()).load(&mut *conn)?)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

fn resolve_field(supplied: Option<&str>, current: Option<&str>, placeholder: impl FnOnce() -> String) -> String {
    non_empty(supplied)
        .or(non_empty(current))
        .map(str::to_string)
        .unwrap_or_else(placeholder)
}

fn upsert_value_type(
    conn: &mut SqliteConnection,
    id: i64,
    name: Option<&str>,
    unit: Option<&str>,
) -> Result<ValueType, StoreError> {
    use schema::value_types::dsl as T;

    let existing = T::value_types
        .find(id)
        .select(ValueType::as_select())
        .first(conn)
        .optional()?;
    let resolved = ValueType {
        id,
        type_name: resolve_field(name, existing.as_ref().map(|t| t.type_name.as_str()), || {
            format!("TYPE_{}", id)
        }),
        type_unit: resolve_field(unit, existing.as_ref().map(|t| t.type_unit.as_str()), || {
            format!("UNIT_{}", id)
        }),
    };

    match existing {
        None => {
            diesel::insert_into(T::value_types).values(&resolved).execute(conn)?;
            info!("Registered value type {} ({}, {})", id, resolved.type_name, resolved.type_unit);
        }
        Some(current) if current != resolved => {
            diesel::update(T::value_types.find(id))
                .set((T::type_name.eq(&resolved.type_name), T::type_unit.eq(&resolved.type_unit)))
                .execute(conn)?;
            debug!("Updated value type {}", id);
        }
        Some(_) => {}
    }
    Ok(resolved)
}

fn load_values(conn: &mut SqliteConnection, filter: &ValueFilter) -> Result<Vec<Value>, StoreError> {
    use schema::sensor_values::dsl as V;

    let mut query = V::sensor_values.select(Value::as_select()).into_boxed();
    if let Some(type_id) = filter.type_id {
        query = query.filter(V::value_type_id.eq(type_id));
    }
    if let Some(start) = filter.start {
        query = query.filter(V::time.ge(start));
    }
    if let Some(end) = filter.end {
        query = query.filter(V::time.le(end));
    }
    if let Some(device_id) = filter.device_id {
        query = query.filter(V::device_id.eq(device_id));
    }
    Ok(query.order((V::time.asc(), V::id.asc())).load(conn)?)
}

fn require_device(conn: &mut SqliteConnection, id: i32) -> Result<Device, StoreError> {
    use schema::devices::dsl as D;

    D::devices
        .find(id)
        .select(Device::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found("device", id))
}

fn insert_device(
    conn: &mut SqliteConnection,
    name: &str,
    description: Option<&str>,
    location_id: Option<i32>,
) -> Result<Device, StoreError> {
    use schema::devices::dsl as D;

    let device = diesel::insert_into(D::devices)
        .values(&NewDevice {
            name,
            description,
            location_id,
        })
        .returning(Device::as_returning())
        .get_result(conn)?;
    info!("Registered device {} ({:?})", device.id, device.name);
    Ok(device)
}

fn ensure_location(conn: &mut SqliteConnection, name: &str) -> Result<Location, StoreError> {
    use schema::locations::dsl as L;

    let existing = L::locations
        .filter(L::name.eq(name))
        .order(L::id.asc())
        .select(Location::as_select())
        .first(conn)
        .optional()?;
    match existing {
        Some(location) => Ok(location),
        None => Ok(diesel::insert_into(L::locations)
            .values(&NewLocation { name })
            .returning(Location::as_returning())
            .get_result(conn)?),
    }
}
