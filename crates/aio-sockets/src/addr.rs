// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `SocketAddr` → raw `sockaddr` conversion.

use std::mem;
use std::net::SocketAddr;

/// Fill a `sockaddr_storage` for `addr`, returning it with the length the
/// kernel should read.
pub(crate) fn std_to_sockaddr(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            // SAFETY: sockaddr_storage is large and aligned enough for sockaddr_in.
            let sin = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in) };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr.s_addr = u32::from(*v4.ip()).to_be();
            mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            // SAFETY: as above, for sockaddr_in6.
            let sin6 = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in6) };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_addr.s6_addr = v6.ip().octets();
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_scope_id = v6.scope_id();
            mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aio_rt::io::sockaddr_to_std;

    #[test]
    fn v4_matches_kernel_layout() {
        let addr: SocketAddr = "10.1.2.3:8880".parse().unwrap();
        let (storage, len) = std_to_sockaddr(&addr);
        assert_eq!(len as usize, mem::size_of::<libc::sockaddr_in>());
        assert_eq!(sockaddr_to_std(&storage), addr);
    }

    #[test]
    fn v6_keeps_scope() {
        let addr: SocketAddr = "[fe80::1%3]:9000".parse().unwrap();
        let (storage, len) = std_to_sockaddr(&addr);
        assert_eq!(len as usize, mem::size_of::<libc::sockaddr_in6>());
        assert_eq!(sockaddr_to_std(&storage), addr);
    }
}
