pub(crate) mod apps;
pub(crate) mod comments;
pub(crate) mod grants;
pub(crate) mod notifications;
pub(crate) mod playlists;
pub(crate) mod social;
pub(crate) mod tracks;
pub(crate) mod users;
pub(crate) mod wallets;
