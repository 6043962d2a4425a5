//! Property tests for the path accumulator and domain normalization.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use tether_client::{CallOptions, Client, ClientConfig, Member, normalize_domain};
use tether_testing::MockFetcher;
use tether_testing::helpers::empty;
use tether_testing::properties::{remote_host, segment, segments};

proptest! {
    #[test]
    fn member_chain_matches_segments(names in segments()) {
        let mut path = Client::new("localhost").path();
        for name in &names {
            path = match path.member(name) {
                Member::Path(next) => next,
                Member::Call(_) => unreachable!("segments never contain verbs"),
            };
        }
        prop_assert_eq!(path.segments(), names.as_slice());
    }

    #[test]
    fn index_is_idempotent(names in segments()) {
        let mut path = Client::new("localhost").path();
        for name in &names {
            path = path.segment(name.clone());
        }
        let aliased = path.index().index();
        prop_assert_eq!(aliased.segments(), path.segments());
    }

    #[test]
    fn remote_hosts_get_https(host in remote_host()) {
        prop_assert_eq!(normalize_domain(&host), format!("https://{host}"));
        prop_assert_eq!(normalize_domain(&format!("{host}/")), format!("https://{host}"));
    }

    #[test]
    fn local_hosts_get_http(port in 1_u16..) {
        for local in ["localhost", "127.0.0.1", "0.0.0.0"] {
            let domain = format!("{local}:{port}");
            prop_assert_eq!(normalize_domain(&domain), format!("http://{domain}"));
        }
    }

    #[test]
    fn issued_url_is_domain_slash_joined_segments(names in segments(), extra in segment()) {
        let fetcher = MockFetcher::new();
        fetcher.respond_with(|_| empty(http::StatusCode::OK));
        let client = Client::with_config(
            "api.example.com/",
            ClientConfig::new().with_fetcher(fetcher.clone()),
        );

        let mut path = client.path();
        for name in &names {
            path = path.segment(name.clone());
        }
        let path = path.param(extra.clone());

        tokio_test::block_on(path.get(CallOptions::new())).unwrap();

        let mut expected = names.clone();
        expected.push(extra);
        prop_assert_eq!(
            fetcher.last_request().unwrap().url,
            format!("https://api.example.com/{}", expected.join("/"))
        );
    }
}
