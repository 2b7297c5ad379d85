#[cfg(test)]
mod repository;
