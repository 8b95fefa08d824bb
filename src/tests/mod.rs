mod condition;
mod responses;
mod udp;
