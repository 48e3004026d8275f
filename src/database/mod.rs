pub mod catalog;
mod redis_connection;

pub use redis_connection::RedisDatabase;
