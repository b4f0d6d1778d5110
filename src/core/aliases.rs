use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::bb8;

pub type DieselError = diesel::result::Error;
pub type DbPool = bb8::Pool<AsyncPgConnection>;
pub type DbConn<'a> = bb8::PooledConnection<'a, AsyncPgConnection>;
