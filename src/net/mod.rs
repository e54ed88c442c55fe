pub mod client_link;
pub mod game_session;
pub mod protocol;
