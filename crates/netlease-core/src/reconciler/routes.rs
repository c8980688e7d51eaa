//! Route delta computation
//!
//! Pure decision logic separated from execution: given the previously
//! owned routes and the routes a new lease offers, compute what must be
//! removed and what is a candidate for installation. Execution and
//! outcome handling stay in the reconciler.

use crate::lease::Route;

/// Routes to delete before the new lease state is installed.
///
/// A previously owned route is stale when no structurally equal route
/// exists in the offer. Default routes are only ours to remove when the
/// policy installs them. This runs on every pass, even when the lease
/// re-offers the same address: the interface may carry other addresses
/// whose routes we do not own, so removal never assumes a clean slate.
pub(crate) fn stale_routes(
    previous: &[Route],
    offered: &[Route],
    install_default_route: bool,
) -> Vec<Route> {
    previous
        .iter()
        .filter(|route| !route.destination.is_unspecified() || install_default_route)
        .filter(|route| !offered.contains(route))
        .copied()
        .collect()
}

/// Offered routes eligible for installation under the policy
pub(crate) fn installable(offered: &[Route], install_default_route: bool) -> Vec<Route> {
    offered
        .iter()
        .filter(|route| install_default_route || !route.is_default())
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn route(dst: &str, mask: &str, gw: &str) -> Route {
        Route::new(dst.parse().unwrap(), mask.parse().unwrap(), gw.parse().unwrap())
    }

    fn default_via(gw: &str) -> Route {
        Route::new(Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED, gw.parse().unwrap())
    }

    #[test]
    fn kept_routes_produce_no_delta() {
        let shared = route("192.168.2.0", "255.255.255.0", "10.0.0.1");
        let previous = vec![shared];
        let offered = vec![shared];

        assert!(stale_routes(&previous, &offered, true).is_empty());
    }

    #[test]
    fn removed_routes_are_stale() {
        let gone = route("192.168.2.0", "255.255.255.0", "10.0.0.1");
        let kept = route("192.168.3.0", "255.255.255.0", "10.0.0.1");
        let previous = vec![gone, kept];
        let offered = vec![kept];

        assert_eq!(stale_routes(&previous, &offered, true), vec![gone]);
    }

    #[test]
    fn gateway_change_is_a_remove_and_add() {
        let old = route("192.168.2.0", "255.255.255.0", "10.0.0.1");
        let new = route("192.168.2.0", "255.255.255.0", "10.0.0.2");

        assert_eq!(stale_routes(&[old], &[new], true), vec![old]);
        assert_eq!(installable(&[new], true), vec![new]);
    }

    #[test]
    fn unmanaged_default_route_is_left_alone() {
        let previous = vec![default_via("10.0.0.1")];

        // Policy never installed default routes, so it does not remove
        // them either.
        assert!(stale_routes(&previous, &[], false).is_empty());
        assert_eq!(stale_routes(&previous, &[], true), previous);
    }

    #[test]
    fn default_route_filtered_from_install_when_disallowed() {
        let offered = vec![
            default_via("10.0.0.1"),
            route("192.168.2.0", "255.255.255.0", "10.0.0.1"),
        ];

        let allowed = installable(&offered, false);
        assert_eq!(allowed, vec![offered[1]]);

        let all = installable(&offered, true);
        assert_eq!(all, offered);
    }

    #[test]
    fn empty_offer_drops_everything_owned() {
        let previous = vec![
            default_via("10.0.0.1"),
            route("192.168.2.0", "255.255.255.0", "10.0.0.1"),
        ];

        assert_eq!(stale_routes(&previous, &[], true), previous);
    }
}
