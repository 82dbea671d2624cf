//! Row decoding and integer conversions between the schema and the domain types.

use boxoffice_core::{
    Capacity, EventId, InventoryError, Money, Reservation, ReservationId, ReservationStatus,
    Result, SaleId, SessionId, TicketType, TicketTypeId,
};
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

/// Column list matching [`row_to_ticket_type`].
pub(crate) const TICKET_TYPE_COLUMNS: &str = "id, event_id, name, price_cents, capacity, \
     sold_count, status, sales_halted, created_at, updated_at";

/// Column list matching [`row_to_reservation`].
pub(crate) const RESERVATION_COLUMNS: &str = "id, ticket_type_id, quantity, session_id, \
     reserved_at, expires_at, status, fulfilled_at, released_at, sale_id, metadata";

/// `u32` count from an `INTEGER` column.
pub(crate) fn count_from_db(column: &str, value: i32) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| InventoryError::Storage(format!("Negative {column} in database: {value}")))
}

/// `INTEGER` value for a `u32` count.
pub(crate) fn count_to_db(column: &str, value: u32) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| InventoryError::Storage(format!("{column} {value} exceeds INTEGER range")))
}

/// `u64` counter from a `BIGINT` column.
pub(crate) fn counter_from_db(column: &str, value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| InventoryError::Storage(format!("Negative {column} in database: {value}")))
}

/// `BIGINT` value for a `u64` counter.
pub(crate) fn counter_to_db(column: &str, value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| InventoryError::Storage(format!("{column} {value} exceeds BIGINT range")))
}

pub(crate) fn row_to_ticket_type(row: &PgRow) -> Result<TicketType> {
    let status: String = row.get("status");
    let capacity: Option<i32> = row.get("capacity");
    let price_cents: i64 = row.get("price_cents");

    Ok(TicketType {
        id: TicketTypeId::from_uuid(row.get("id")),
        event_id: EventId::from_uuid(row.get("event_id")),
        name: row.get("name"),
        price: Money::from_cents(counter_from_db("price_cents", price_cents)?),
        capacity: capacity
            .map(|c| count_from_db("capacity", c).map(Capacity::new))
            .transpose()?,
        sold_count: count_from_db("sold_count", row.get("sold_count"))?,
        status: status.parse()?,
        sales_halted: row.get("sales_halted"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

pub(crate) fn row_to_reservation(row: &PgRow) -> Result<Reservation> {
    let status: String = row.get("status");
    let sale_id: Option<Uuid> = row.get("sale_id");

    Ok(Reservation {
        id: ReservationId::from_uuid(row.get("id")),
        ticket_type_id: TicketTypeId::from_uuid(row.get("ticket_type_id")),
        quantity: count_from_db("quantity", row.get("quantity"))?,
        session_id: SessionId::new(row.get::<String, _>("session_id")),
        reserved_at: row.get("reserved_at"),
        expires_at: row.get("expires_at"),
        status: status.parse::<ReservationStatus>()?,
        fulfilled_at: row.get("fulfilled_at"),
        released_at: row.get("released_at"),
        sale_id: sale_id.map(SaleId::from_uuid),
        metadata: row.get("metadata"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_counts() {
        assert_eq!(count_from_db("sold_count", 7).ok(), Some(7));
        assert!(count_from_db("sold_count", -1).is_err());
        assert!(count_to_db("quantity", u32::MAX).is_err());
        assert!(counter_to_db("last_number", u64::MAX).is_err());
        assert_eq!(counter_from_db("last_number", 42).ok(), Some(42));
    }
}
