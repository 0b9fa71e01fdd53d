pub mod test_ring_timeout;
pub mod test_relay_offline;
