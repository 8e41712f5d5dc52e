mod tests_encoding;
mod tests_upsert;
