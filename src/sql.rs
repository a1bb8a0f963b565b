use chrono::NaiveDate;
use sqlparser::ast::{self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertUser {
        id: Ulid,
        name: String,
        email: String,
        role: UserRole,
    },
    InsertHostel {
        id: Ulid,
        owner_id: Ulid,
        name: String,
        city: String,
        address: String,
    },
    SetHostelApproval {
        id: Ulid,
        approved: bool,
    },
    InsertRoom {
        id: Ulid,
        hostel_id: Ulid,
        room_type: RoomType,
        total_beds: u32,
        price_per_night: f64,
    },
    UpdateRoom {
        id: Ulid,
        patch: RoomPatch,
    },
    /// The availability-only form of `UPDATE rooms`.
    SetRoomAvailability {
        id: Ulid,
        available_beds: u32,
    },
    DeleteRoom {
        id: Ulid,
    },
    /// Trailing optional status column; defaults to CONFIRMED when absent.
    InsertBooking {
        id: Ulid,
        user_id: Ulid,
        hostel_id: Ulid,
        room_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        beds: u32,
        status: BookingStatus,
    },
    DeleteBooking {
        id: Ulid,
    },
    SetBookingStatus {
        id: Ulid,
        status: BookingStatus,
    },
    InsertPayment {
        id: Ulid,
        booking_id: Ulid,
        method: PaymentMethod,
        instrument: Option<String>,
    },
    RefundPayment {
        id: Ulid,
    },
    SelectUsers,
    SelectHostels {
        city: Option<String>,
    },
    SelectRooms {
        hostel_id: Option<Ulid>,
    },
    SelectBookings {
        filter: BookingFilter,
    },
    SelectPayments {
        filter: PaymentFilter,
    },
    SelectStatistics,
    Listen {
        channel: String,
    },
    /// `UNLISTEN *` carries no channel.
    Unlisten {
        channel: Option<String>,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    let upper = trimmed.to_uppercase();
    if upper.starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').trim().to_string();
        return Ok(Command::Listen { channel });
    }
    if upper.starts_with("UNLISTEN") {
        let rest = trimmed[8..].trim().trim_matches(';').trim();
        return if rest == "*" {
            Ok(Command::Unlisten { channel: None })
        } else if rest.is_empty() {
            Err(SqlError::Parse("UNLISTEN requires a channel or *".into()))
        } else {
            Ok(Command::Unlisten { channel: Some(rest.to_string()) })
        };
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update { table, assignments, selection, .. } => {
            parse_update(table, assignments, selection)
        }
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "users" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("users", 4, values.len()));
            }
            Ok(Command::InsertUser {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
                email: parse_string(&values[2])?,
                role: parse_role(&values[3])?,
            })
        }
        "hostels" => {
            if values.len() < 5 {
                return Err(SqlError::WrongArity("hostels", 5, values.len()));
            }
            Ok(Command::InsertHostel {
                id: parse_ulid(&values[0])?,
                owner_id: parse_ulid(&values[1])?,
                name: parse_string(&values[2])?,
                city: parse_string(&values[3])?,
                address: parse_string(&values[4])?,
            })
        }
        "rooms" => {
            if values.len() < 5 {
                return Err(SqlError::WrongArity("rooms", 5, values.len()));
            }
            Ok(Command::InsertRoom {
                id: parse_ulid(&values[0])?,
                hostel_id: parse_ulid(&values[1])?,
                room_type: parse_room_type(&values[2])?,
                total_beds: parse_u32(&values[3])?,
                price_per_night: parse_f64(&values[4])?,
            })
        }
        "bookings" => {
            if values.len() < 7 {
                return Err(SqlError::WrongArity("bookings", 7, values.len()));
            }
            let status = if values.len() >= 8 {
                parse_booking_status(&values[7])?
            } else {
                BookingStatus::Confirmed
            };
            Ok(Command::InsertBooking {
                id: parse_ulid(&values[0])?,
                user_id: parse_ulid(&values[1])?,
                hostel_id: parse_ulid(&values[2])?,
                room_id: parse_ulid(&values[3])?,
                check_in: parse_date(&values[4])?,
                check_out: parse_date(&values[5])?,
                beds: parse_u32(&values[6])?,
                status,
            })
        }
        "payments" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("payments", 3, values.len()));
            }
            let instrument = if values.len() >= 4 {
                parse_string_or_null(&values[3])?
            } else {
                None
            };
            Ok(Command::InsertPayment {
                id: parse_ulid(&values[0])?,
                booking_id: parse_ulid(&values[1])?,
                method: parse_payment_method(&values[2])?,
                instrument,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    let id = extract_where_id(selection)?;

    match table.as_str() {
        "hostels" => {
            let (col, value) = single_assignment(assignments, "hostels")?;
            if col != "approved" {
                return Err(SqlError::UnknownColumn(col));
            }
            Ok(Command::SetHostelApproval { id, approved: parse_bool(value)? })
        }
        "rooms" => {
            let mut patch = RoomPatch::default();
            for assignment in assignments {
                let col = assignment_column(assignment)
                    .ok_or_else(|| SqlError::Parse("unsupported assignment target".into()))?;
                match col.as_str() {
                    "room_type" => patch.room_type = Some(parse_room_type(&assignment.value)?),
                    "total_beds" => patch.total_beds = Some(parse_u32(&assignment.value)?),
                    "available_beds" => {
                        patch.available_beds = Some(parse_u32(&assignment.value)?);
                    }
                    "price_per_night" => {
                        patch.price_per_night = Some(parse_f64(&assignment.value)?);
                    }
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            match patch {
                RoomPatch {
                    room_type: None,
                    total_beds: None,
                    available_beds: Some(available_beds),
                    price_per_night: None,
                } => Ok(Command::SetRoomAvailability { id, available_beds }),
                _ => Ok(Command::UpdateRoom { id, patch }),
            }
        }
        "bookings" => {
            let (col, value) = single_assignment(assignments, "bookings")?;
            if col != "status" {
                return Err(SqlError::UnknownColumn(col));
            }
            Ok(Command::SetBookingStatus { id, status: parse_booking_status(value)? })
        }
        "payments" => {
            let (col, value) = single_assignment(assignments, "payments")?;
            if col != "status" {
                return Err(SqlError::UnknownColumn(col));
            }
            let status = parse_payment_status(value)?;
            if status != PaymentStatus::Refunded {
                return Err(SqlError::Unsupported(format!(
                    "payments.status can only be set to REFUNDED, got {}",
                    status.as_str()
                )));
            }
            Ok(Command::RefundPayment { id })
        }
        "users" => Err(SqlError::Unsupported("UPDATE users".into())),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "rooms" => Ok(Command::DeleteRoom { id }),
        "bookings" => Ok(Command::DeleteBooking { id }),
        "users" | "hostels" | "payments" => {
            Err(SqlError::Unsupported(format!("DELETE FROM {table}")))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_eq_filters(selection, &mut filters)?;
    }

    match table.as_str() {
        "users" => {
            if let Some((col, _)) = filters.first() {
                return Err(SqlError::UnknownColumn(col.clone()));
            }
            Ok(Command::SelectUsers)
        }
        "hostels" => {
            let city = match filters.as_slice() {
                [] => None,
                [(col, value)] if col == "city" => Some(parse_string(value)?),
                [(col, _)] => return Err(SqlError::UnknownColumn(col.clone())),
                _ => return Err(SqlError::ConflictingFilters("hostels")),
            };
            Ok(Command::SelectHostels { city })
        }
        "rooms" => {
            let hostel_id = match filters.as_slice() {
                [] => None,
                [(col, value)] if col == "hostel_id" => Some(parse_ulid(value)?),
                [(col, _)] => return Err(SqlError::UnknownColumn(col.clone())),
                _ => return Err(SqlError::ConflictingFilters("rooms")),
            };
            Ok(Command::SelectRooms { hostel_id })
        }
        "bookings" => {
            let filter = match filters.as_slice() {
                [] => BookingFilter::All,
                [(col, value)] => match col.as_str() {
                    "id" => BookingFilter::Id(parse_ulid(value)?),
                    "user_id" => BookingFilter::User(parse_ulid(value)?),
                    "hostel_id" => BookingFilter::Hostel(parse_ulid(value)?),
                    "room_id" => BookingFilter::Room(parse_ulid(value)?),
                    "owner_id" => BookingFilter::Owner(parse_ulid(value)?),
                    "status" => BookingFilter::Status(parse_booking_status(value)?),
                    _ => return Err(SqlError::UnknownColumn(col.clone())),
                },
                _ => return Err(SqlError::ConflictingFilters("bookings")),
            };
            Ok(Command::SelectBookings { filter })
        }
        "payments" => {
            let filter = match filters.as_slice() {
                [] => PaymentFilter::All,
                [(col, value)] => match col.as_str() {
                    "id" => PaymentFilter::Id(parse_ulid(value)?),
                    "booking_id" => PaymentFilter::Booking(parse_ulid(value)?),
                    "user_id" => PaymentFilter::User(parse_ulid(value)?),
                    _ => return Err(SqlError::UnknownColumn(col.clone())),
                },
                _ => return Err(SqlError::ConflictingFilters("payments")),
            };
            Ok(Command::SelectPayments { filter })
        }
        "booking_statistics" => {
            if let Some((col, _)) = filters.first() {
                return Err(SqlError::UnknownColumn(col.clone()));
            }
            Ok(Command::SelectStatistics)
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn collect_eq_filters<'a>(
    expr: &'a Expr,
    out: &mut Vec<(String, &'a Expr)>,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op: ast::BinaryOperator::And, right } => {
            collect_eq_filters(left, out)?;
            collect_eq_filters(right, out)
        }
        Expr::BinaryOp { left, op: ast::BinaryOperator::Eq, right } => {
            match expr_column_name(left) {
                Some(col) => {
                    out.push((col, right.as_ref()));
                    Ok(())
                }
                None => Err(SqlError::Parse(format!("expected column left of =, got {left}"))),
            }
        }
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        other => Err(SqlError::Unsupported(format!("filter: {other}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            if values.rows.len() > 1 {
                return Err(SqlError::MultiRow(values.rows.len()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn single_assignment<'a>(
    assignments: &'a [ast::Assignment],
    table: &'static str,
) -> Result<(String, &'a Expr), SqlError> {
    if assignments.len() != 1 {
        return Err(SqlError::Unsupported(format!(
            "{table} UPDATE must set exactly one column"
        )));
    }
    let assignment = &assignments[0];
    let col = assignment_column(assignment)
        .ok_or_else(|| SqlError::Parse("unsupported assignment target".into()))?;
    Ok((col, &assignment.value))
}

fn assignment_column(assignment: &ast::Assignment) -> Option<String> {
    match &assignment.target {
        AssignmentTarget::ColumnName(name) => object_name_last(name),
        _ => None,
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Null => Ok(None),
            Value::SingleQuotedString(s) => Ok(Some(s.clone())),
            _ => Err(SqlError::Parse(format!(
                "expected string or NULL, got {value:?}"
            ))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| SqlError::Parse(format!("bad date {s:?}: {e}")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if matches!(expr, Expr::UnaryOp { op: ast::UnaryOperator::Minus, .. }) {
        Err(SqlError::Parse("negative value not allowed".into()))
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_f64(expr: &Expr) -> Result<f64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad number: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_f64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_role(expr: &Expr) -> Result<UserRole, SqlError> {
    let s = parse_string(expr)?;
    UserRole::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad role: {s}")))
}

fn parse_room_type(expr: &Expr) -> Result<RoomType, SqlError> {
    let s = parse_string(expr)?;
    RoomType::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad room type: {s}")))
}

fn parse_booking_status(expr: &Expr) -> Result<BookingStatus, SqlError> {
    let s = parse_string(expr)?;
    BookingStatus::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad booking status: {s}")))
}

fn parse_payment_status(expr: &Expr) -> Result<PaymentStatus, SqlError> {
    let s = parse_string(expr)?;
    PaymentStatus::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad payment status: {s}")))
}

fn parse_payment_method(expr: &Expr) -> Result<PaymentMethod, SqlError> {
    let s = parse_string(expr)?;
    PaymentMethod::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad payment method: {s}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    MultiRow(usize),
    ConflictingFilters(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::MultiRow(n) => {
                write!(f, "multi-row INSERT is not supported (got {n} rows)")
            }
            SqlError::ConflictingFilters(t) => write!(f, "{t}: at most one filter per query"),
        }
    }
}

impl std::error::Error for SqlError {}
