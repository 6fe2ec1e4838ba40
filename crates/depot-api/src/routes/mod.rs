//! # Route Handlers
//!
//! Every request lands in [`objects::dispatch`], which routes by method:
//!
//! | Method    | Behaviour                                   |
//! |-----------|---------------------------------------------|
//! | `OPTIONS` | `200` with the `Allow` header               |
//! | `GET`     | serve the stored file                       |
//! | `PUT`     | store the body, `204` on success            |
//! | `DELETE`  | remove the object, `204` on success         |
//! | other     | `405`                                       |

pub mod objects;
