pub mod feed;
pub mod follows;
pub mod memory;
pub mod microposts;
pub mod users;

use diesel_async::pooled_connection::deadpool;
use diesel_async::AsyncPgConnection;

pub use feed::FeedService;
pub use follows::FollowGraph;
pub use memory::MemoryStore;
pub use microposts::MicropostService;
pub use users::UserService;

pub type Pool = deadpool::Pool<AsyncPgConnection>;

pub trait Svc: Clone + Send + Sync + 'static {}

/// Everything the request handlers need from persistence.
pub trait Store: UserService + MicropostService + FollowGraph + FeedService {}

impl<T> Store for T where T: UserService + MicropostService + FollowGraph + FeedService {}

#[derive(Clone)]
pub struct DbStore {
    db: Pool,
}

impl Svc for DbStore {}

impl DbStore {
    pub fn new(db: Pool) -> Self {
        Self { db }
    }
}
