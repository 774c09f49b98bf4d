mod financials;
mod order_number;

pub use financials::{allocate_shipping, LineFinancials, OrderTotals};
pub use order_number::{
    new_order_number,
    order_number_for,
    parse_order_number,
    sub_order_number,
    OrderNumberGenerator,
    OrderNumberParts,
    MAX_ORDER_NUMBER_ATTEMPTS,
};
