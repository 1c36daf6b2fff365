pub mod mock_session_client;

pub use mock_session_client::MockSessionClient;
