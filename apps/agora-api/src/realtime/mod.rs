pub mod bus;
pub mod emitter;
pub mod events;
pub mod gateway;
pub mod redis_bus;
