pub mod calls;
pub mod config;

pub mod types {
    pub mod events;
    pub mod jid;
}
