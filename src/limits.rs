//! Hard caps. Every unbounded input the wire layer can reach is checked
//! against one of these before it grows state.

/// Max users registered per tenant.
pub const MAX_USERS_PER_TENANT: usize = 100_000;

/// Max hostels per tenant.
pub const MAX_HOSTELS_PER_TENANT: usize = 10_000;

/// Max rooms per tenant.
pub const MAX_ROOMS_PER_TENANT: usize = 100_000;

/// Max bookings held on a single room, cancelled ones included.
pub const MAX_BOOKINGS_PER_ROOM: usize = 10_000;

/// Max beds a single room may declare.
pub const MAX_BEDS_PER_ROOM: u32 = 500;

/// Max length of a stay in nights.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Earliest year accepted for any booking date.
pub const MIN_VALID_YEAR: i32 = 2000;

/// Latest year accepted for any booking date.
pub const MAX_VALID_YEAR: i32 = 2100;

/// Max length of user and hostel names.
pub const MAX_NAME_LEN: usize = 120;

/// Max length of a user email.
pub const MAX_EMAIL_LEN: usize = 120;

/// Max length of a hostel city.
pub const MAX_CITY_LEN: usize = 80;

/// Max length of a hostel street address.
pub const MAX_ADDRESS_LEN: usize = 200;

/// Max length of the opaque payment instrument string.
pub const MAX_INSTRUMENT_LEN: usize = 120;

/// Max length of a tenant (database) name after sanitization.
pub const MAX_TENANT_NAME_LEN: usize = 64;

/// Max concurrently live tenants per process.
pub const MAX_TENANTS: usize = 1024;
