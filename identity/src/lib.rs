//! Agora identity service.
//!
//! Owns user accounts and refresh tokens. Issues the HS256 access tokens the
//! gateway verifies, and answers batched user lookups for post-service.
//!
//! | Route                            | Purpose                                   |
//! |----------------------------------|-------------------------------------------|
//! | `POST /api/auth/register`        | create account, open session              |
//! | `POST /api/auth/login`           | open session                              |
//! | `POST /api/auth/refresh-token`   | rotate the `refreshToken` cookie          |
//! | `POST /api/auth/logout`          | revoke the refresh token, clear cookie    |
//! | `GET /api/auth/get-many-users`   | `?ids=a,b,c` public lookup                |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod handlers;
pub mod password;
pub mod service;

pub use handlers::router;
pub use service::IdentityService;
