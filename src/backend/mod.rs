pub mod mangadex;

#[cfg(test)]
pub mod test_server;
