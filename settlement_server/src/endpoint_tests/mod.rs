mod auth;
mod helpers;
mod orders;
mod payments;
mod payouts;
