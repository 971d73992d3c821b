pub mod forwarder;
pub mod metrics;
pub mod negotiator;
pub mod playlist_rewriter;
pub mod stream_urls;
pub mod streamer;
pub mod xtream;

#[cfg(test)]
pub mod test_origin;
