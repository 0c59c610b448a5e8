//! Diesel model structs for the sensor tables.
//!
//! Row structs double as the outward API shape: they serialize to the same
//! JSON a request layer hands out.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema;

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::locations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Location {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::locations)]
pub struct NewLocation<'a> {
    pub name: &'a str,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::devices)]
#[diesel(belongs_to(Location))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Device {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub location_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::devices)]
pub struct NewDevice<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub location_id: Option<i32>,
}

/// Partial patch; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = schema::devices)]
pub struct DevicePatch<'a> {
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub updated_at: Option<NaiveDateTime>,
}

/// A measurement kind. The id comes from the producing device.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::value_types)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ValueType {
    pub id: i64,
    pub type_name: String,
    pub type_unit: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::sensor_values)]
#[diesel(belongs_to(ValueType))]
#[diesel(belongs_to(Device))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Value {
    pub id: i32,
    pub time: i64,
    pub value: f64,
    pub value_type_id: i64,
    pub device_id: Option<i32>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::sensor_values)]
pub struct NewValue {
    pub time: i64,
    pub value: f64,
    pub value_type_id: i64,
    pub device_id: Option<i32>,
}
