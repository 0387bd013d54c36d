mod conversations;
mod friendships;
mod messages;
mod users;
