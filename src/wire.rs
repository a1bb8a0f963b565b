use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::{Sink, SinkExt};
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::data::DataRow;
use pgwire::messages::response::NotificationResponse;
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use ulid::Ulid;

use crate::auth::BunkdAuthSource;
use crate::engine::{Engine, EngineError, ErrorClass};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, SqlError};
use crate::tenant::TenantManager;

pub struct BunkdHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<BunkdQueryParser>,
    /// LISTEN state for this connection, keyed by channel name. Pending
    /// events are drained into NOTIFY messages at each query boundary.
    subscriptions: Mutex<HashMap<String, broadcast::Receiver<Event>>>,
}

impl BunkdHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(BunkdQueryParser),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    /// Forward buffered room events to this connection as NOTIFY messages.
    /// Called at every query boundary, so a subscriber sees pending
    /// notifications the next time it talks to the server.
    async fn drain_notifications<C>(&self, client: &mut C) -> PgWireResult<()>
    where
        C: Sink<PgWireBackendMessage> + Unpin + Send,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let mut subs = self.subscriptions.lock().await;
        let mut closed = Vec::new();
        for (channel, rx) in subs.iter_mut() {
            loop {
                match rx.try_recv() {
                    Ok(event) => {
                        let payload = serde_json::to_string(&event)
                            .unwrap_or_else(|_| "{}".to_string());
                        let msg = NotificationResponse::new(
                            std::process::id() as i32,
                            channel.clone(),
                            payload,
                        );
                        client
                            .feed(PgWireBackendMessage::NotificationResponse(msg))
                            .await?;
                    }
                    Err(broadcast::error::TryRecvError::Empty) => break,
                    Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                    Err(broadcast::error::TryRecvError::Closed) => {
                        // Room deleted; its channel will never fire again.
                        closed.push(channel.clone());
                        break;
                    }
                }
            }
        }
        for channel in closed {
            subs.remove(&channel);
        }
        Ok(())
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertUser { id, name, email, role } => {
                engine
                    .register_user(id, name, email, role)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::InsertHostel { id, owner_id, name, city, address } => {
                engine
                    .add_hostel(id, owner_id, name, city, address)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::SetHostelApproval { id, approved } => {
                engine
                    .set_hostel_approval(id, approved)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::InsertRoom { id, hostel_id, room_type, total_beds, price_per_night } => {
                engine
                    .add_room(id, hostel_id, room_type, total_beds, price_per_night)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateRoom { id, patch } => {
                engine.update_room(id, patch).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::SetRoomAvailability { id, available_beds } => {
                engine
                    .set_room_availability(id, available_beds)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteRoom { id } => {
                engine.delete_room(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertBooking {
                id,
                user_id,
                hostel_id,
                room_id,
                check_in,
                check_out,
                beds,
                status,
            } => {
                engine
                    .create_booking(
                        id,
                        user_id,
                        hostel_id,
                        room_id,
                        StayRange::new(check_in, check_out),
                        beds,
                        status,
                    )
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteBooking { id } => {
                engine.cancel_booking(id, None).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SetBookingStatus { id, status } => {
                engine.update_status(id, status).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::InsertPayment { id, booking_id, method, instrument } => {
                engine
                    .process_payment(id, booking_id, method, instrument)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::RefundPayment { id } => {
                engine.refund_payment(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::SelectUsers => {
                let users = engine.list_users();
                let schema = Arc::new(users_schema());
                let rows = encode_users(&schema, users);
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectHostels { city } => {
                let hostels = engine.list_hostels(city.as_deref());
                let schema = Arc::new(hostels_schema());
                let rows = encode_hostels(&schema, hostels);
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectRooms { hostel_id } => {
                let rooms = engine.list_rooms(hostel_id).await;
                let schema = Arc::new(rooms_schema());
                let rows = encode_rooms(&schema, rooms);
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectBookings { filter } => {
                let bookings = engine.list_bookings(filter).await;
                let schema = Arc::new(bookings_schema());
                let rows = encode_bookings(&schema, bookings);
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectPayments { filter } => {
                let payments = engine.list_payments(filter).await;
                let schema = Arc::new(payments_schema());
                let rows = encode_payments(&schema, payments);
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectStatistics => {
                let stats = engine.statistics().await;
                let schema = Arc::new(statistics_schema());
                let rows = encode_statistics(&schema, stats);
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::Listen { channel } => {
                let room_id = parse_room_channel(&channel)?;
                let rx = engine.notify.subscribe(room_id);
                // Re-LISTEN replaces the receiver, so a channel is
                // delivered at most once per connection.
                self.subscriptions.lock().await.insert(channel, rx);
                Ok(vec![Response::Execution(Tag::new("LISTEN"))])
            }
            Command::Unlisten { channel } => {
                let mut subs = self.subscriptions.lock().await;
                match channel {
                    Some(channel) => {
                        subs.remove(&channel);
                    }
                    None => subs.clear(),
                }
                Ok(vec![Response::Execution(Tag::new("UNLISTEN"))])
            }
        }
    }
}

// ── Row schemas ──────────────────────────────────────────────────

fn text_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn users_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("name", Type::VARCHAR),
        text_field("email", Type::VARCHAR),
        text_field("role", Type::VARCHAR),
    ]
}

fn hostels_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("owner_id", Type::VARCHAR),
        text_field("name", Type::VARCHAR),
        text_field("city", Type::VARCHAR),
        text_field("address", Type::VARCHAR),
        text_field("approved", Type::BOOL),
    ]
}

fn rooms_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("hostel_id", Type::VARCHAR),
        text_field("room_type", Type::VARCHAR),
        text_field("total_beds", Type::INT8),
        text_field("available_beds", Type::INT8),
        text_field("price_per_night", Type::FLOAT8),
    ]
}

fn bookings_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("user_id", Type::VARCHAR),
        text_field("hostel_id", Type::VARCHAR),
        text_field("room_id", Type::VARCHAR),
        text_field("check_in", Type::VARCHAR),
        text_field("check_out", Type::VARCHAR),
        text_field("beds", Type::INT8),
        text_field("total_price", Type::FLOAT8),
        text_field("status", Type::VARCHAR),
        text_field("booked_at", Type::VARCHAR),
        text_field("payment_id", Type::VARCHAR),
    ]
}

fn payments_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("booking_id", Type::VARCHAR),
        text_field("amount", Type::FLOAT8),
        text_field("status", Type::VARCHAR),
        text_field("method", Type::VARCHAR),
        text_field("transaction_id", Type::VARCHAR),
        text_field("paid_at", Type::VARCHAR),
        text_field("created_at", Type::VARCHAR),
        text_field("failure_reason", Type::VARCHAR),
    ]
}

fn statistics_schema() -> Vec<FieldInfo> {
    vec![
        text_field("total", Type::INT8),
        text_field("confirmed", Type::INT8),
        text_field("cancelled", Type::INT8),
        text_field("completed", Type::INT8),
    ]
}

// ── Row encoding ─────────────────────────────────────────────────

fn encode_users(schema: &Arc<Vec<FieldInfo>>, users: Vec<User>) -> Vec<PgWireResult<DataRow>> {
    users
        .into_iter()
        .map(|u| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&u.id.to_string())?;
            encoder.encode_field(&u.name)?;
            encoder.encode_field(&u.email)?;
            encoder.encode_field(&u.role.as_str())?;
            Ok(encoder.take_row())
        })
        .collect()
}

fn encode_hostels(
    schema: &Arc<Vec<FieldInfo>>,
    hostels: Vec<Hostel>,
) -> Vec<PgWireResult<DataRow>> {
    hostels
        .into_iter()
        .map(|h| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&h.id.to_string())?;
            encoder.encode_field(&h.owner_id.to_string())?;
            encoder.encode_field(&h.name)?;
            encoder.encode_field(&h.city)?;
            encoder.encode_field(&h.address)?;
            encoder.encode_field(&h.approved)?;
            Ok(encoder.take_row())
        })
        .collect()
}

fn encode_rooms(
    schema: &Arc<Vec<FieldInfo>>,
    rooms: Vec<RoomInfo>,
) -> Vec<PgWireResult<DataRow>> {
    rooms
        .into_iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&r.id.to_string())?;
            encoder.encode_field(&r.hostel_id.to_string())?;
            encoder.encode_field(&r.room_type.as_str())?;
            encoder.encode_field(&(r.total_beds as i64))?;
            encoder.encode_field(&(r.available_beds as i64))?;
            encoder.encode_field(&r.price_per_night)?;
            Ok(encoder.take_row())
        })
        .collect()
}

fn encode_bookings(
    schema: &Arc<Vec<FieldInfo>>,
    bookings: Vec<Booking>,
) -> Vec<PgWireResult<DataRow>> {
    bookings
        .into_iter()
        .map(|b| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&b.id.to_string())?;
            encoder.encode_field(&b.user_id.to_string())?;
            encoder.encode_field(&b.hostel_id.to_string())?;
            encoder.encode_field(&b.room_id.to_string())?;
            encoder.encode_field(&b.stay.check_in.to_string())?;
            encoder.encode_field(&b.stay.check_out.to_string())?;
            encoder.encode_field(&(b.beds as i64))?;
            encoder.encode_field(&b.total_price)?;
            encoder.encode_field(&b.status.as_str())?;
            encoder.encode_field(&b.booked_at.to_rfc3339())?;
            encoder.encode_field(&b.payment.as_ref().map(|p| p.id.to_string()))?;
            Ok(encoder.take_row())
        })
        .collect()
}

fn encode_payments(
    schema: &Arc<Vec<FieldInfo>>,
    payments: Vec<Payment>,
) -> Vec<PgWireResult<DataRow>> {
    payments
        .into_iter()
        .map(|p| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&p.id.to_string())?;
            encoder.encode_field(&p.booking_id.to_string())?;
            encoder.encode_field(&p.amount)?;
            encoder.encode_field(&p.status.as_str())?;
            encoder.encode_field(&p.method.as_str())?;
            encoder.encode_field(&p.transaction_id)?;
            encoder.encode_field(&p.paid_at.map(|t| t.to_rfc3339()))?;
            encoder.encode_field(&p.created_at.to_rfc3339())?;
            encoder.encode_field(&p.failure_reason)?;
            Ok(encoder.take_row())
        })
        .collect()
}

fn encode_statistics(
    schema: &Arc<Vec<FieldInfo>>,
    stats: BookingStatistics,
) -> Vec<PgWireResult<DataRow>> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    let row = (|| {
        encoder.encode_field(&(stats.total as i64))?;
        encoder.encode_field(&(stats.confirmed as i64))?;
        encoder.encode_field(&(stats.cancelled as i64))?;
        encoder.encode_field(&(stats.completed as i64))?;
        Ok(encoder.take_row())
    })();
    vec![row]
}

/// Best-effort result schema from the raw SQL text, for Describe. Works on
/// statements that still carry $n placeholders, which the real parser
/// cannot digest.
fn result_schema_for(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("BOOKING_STATISTICS") {
        statistics_schema()
    } else if upper.contains("BOOKINGS") {
        bookings_schema()
    } else if upper.contains("PAYMENTS") {
        payments_schema()
    } else if upper.contains("ROOMS") {
        rooms_schema()
    } else if upper.contains("HOSTELS") {
        hostels_schema()
    } else if upper.contains("USERS") {
        users_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for BunkdHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        self.drain_notifications(client).await?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(&engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct BunkdQueryParser;

#[async_trait]
impl QueryParser for BunkdQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema_for(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for BunkdHandler {
    type Statement = String;
    type QueryParser = BunkdQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        self.drain_notifications(client).await?;
        let sql = substitute_params(&portal.statement.statement, &portal.parameters);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(&engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let mut responses = result?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema_for(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema_for(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
/// Single-quoted literals are skipped, so a `$2` inside a string value
/// does not inflate the declared parameter count.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;
    while let Some(ch) = chars.next() {
        if ch == '\'' {
            in_literal = !in_literal;
            continue;
        }
        if ch != '$' || in_literal {
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().copied() {
            if !d.is_ascii_digit() {
                break;
            }
            digits.push(d);
            chars.next();
        }
        if let Ok(n) = digits.parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text
/// format). One forward pass over the statement text: placeholders inside
/// single-quoted literals stay verbatim, and substituted values are never
/// rescanned, so a `$1` in a string literal or in a bound value survives
/// intact.
fn substitute_params<T: AsRef<[u8]>>(sql: &str, params: &[Option<T>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;

    while let Some(ch) = chars.next() {
        if ch == '\'' {
            in_literal = !in_literal;
            out.push(ch);
            continue;
        }
        if ch != '$' || in_literal {
            out.push(ch);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().copied() {
            if !d.is_ascii_digit() {
                break;
            }
            digits.push(d);
            chars.next();
        }
        let bound = digits
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| params.get(idx));
        match bound {
            Some(Some(value)) => {
                let text = String::from_utf8_lossy(value.as_ref());
                out.push('\'');
                out.push_str(&text.replace('\'', "''"));
                out.push('\'');
            }
            Some(None) => out.push_str("NULL"),
            // Bare `$`, or an index nothing is bound to: leave as written.
            None => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }

    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct BunkdFactory {
    handler: Arc<BunkdHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<BunkdAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl BunkdFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = BunkdAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(BunkdHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for BunkdFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection. Each connection gets its own factory, so
/// LISTEN subscriptions live and die with the socket.
pub async fn process_connection(
    socket: TcpStream,
    tenants: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = BunkdFactory::new(tenants, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn parse_room_channel(channel: &str) -> PgWireResult<Ulid> {
    let id = channel.strip_prefix("room_").ok_or_else(|| {
        PgWireError::UserError(Box::new(ErrorInfo::new(
            "ERROR".into(),
            "42000".into(),
            format!("invalid channel: {channel} (expected room_{{id}})"),
        )))
    })?;
    Ulid::from_string(id).map_err(|e| {
        PgWireError::UserError(Box::new(ErrorInfo::new(
            "ERROR".into(),
            "42000".into(),
            format!("bad ULID in channel: {e}"),
        )))
    })
}

fn engine_err(e: EngineError) -> PgWireError {
    let code = match e.class() {
        ErrorClass::NotFound => "P0002",
        ErrorClass::InvalidRequest => "P0001",
        ErrorClass::Internal => "XX000",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    let code = match &e {
        SqlError::UnknownTable(_) => "42P01",
        SqlError::UnknownColumn(_) => "42703",
        _ => "42601",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}
