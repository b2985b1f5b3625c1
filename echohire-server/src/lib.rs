pub mod http;
pub mod services;
pub mod subsystems;

#[cfg(test)]
mod test_support;
