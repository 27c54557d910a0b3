//! Method table and dispatch.
//!
//! Methods are registered by name with their arity. Dispatch is a lookup,
//! an explicit arity check, then the call itself on the blocking pool:
//!
//! | outcome | fault |
//! |---|---|
//! | name not registered | 2 |
//! | wrong argument count, or an argument of the wrong type | 3 |
//! | method returned `MethodError::Failed` or panicked | 4 |

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use super::document::Response;
use crate::error::MethodError;
use crate::value::{FromValue, Value};

/// A callable exposed over RPC.
pub trait Method: Send + Sync + 'static {
    /// Number of positional parameters the method takes.
    fn arity(&self) -> usize;

    /// Run the method. `params.len()` has already been checked against
    /// [`Method::arity`].
    fn call(&self, params: Vec<Value>) -> Result<Value, MethodError>;
}

/// Conversion of a plain function into a [`Method`].
///
/// Implemented for closures taking up to six `FromValue` arguments and
/// returning `Result<R, MethodError>` with `R: Into<Value>`.
pub trait IntoMethod<Args>: Send + Sync + Sized + 'static {
    fn into_method(self) -> Arc<dyn Method>;
}

struct FnMethod<F, Args> {
    f: F,
    _args: PhantomData<fn(Args)>,
}

macro_rules! impl_into_method {
    ($arity:expr; $($ty:ident),*) => {
        impl<F, R, $($ty,)*> Method for FnMethod<F, ($($ty,)*)>
        where
            F: Fn($($ty),*) -> Result<R, MethodError> + Send + Sync + 'static,
            R: Into<Value>,
            $($ty: FromValue + 'static,)*
        {
            fn arity(&self) -> usize {
                $arity
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, params: Vec<Value>) -> Result<Value, MethodError> {
                let mut params = params.into_iter();
                $(
                    let $ty = $ty::from_value(
                        params
                            .next()
                            .ok_or_else(|| MethodError::invalid_params("missing argument"))?,
                    )?;
                )*
                (self.f)($($ty),*).map(Into::into)
            }
        }

        impl<F, R, $($ty,)*> IntoMethod<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> Result<R, MethodError> + Send + Sync + 'static,
            R: Into<Value>,
            $($ty: FromValue + 'static,)*
        {
            fn into_method(self) -> Arc<dyn Method> {
                Arc::new(FnMethod {
                    f: self,
                    _args: PhantomData::<fn(($($ty,)*))>,
                })
            }
        }
    };
}

impl_into_method!(0;);
impl_into_method!(1; A1);
impl_into_method!(2; A1, A2);
impl_into_method!(3; A1, A2, A3);
impl_into_method!(4; A1, A2, A3, A4);
impl_into_method!(5; A1, A2, A3, A4, A5);
impl_into_method!(6; A1, A2, A3, A4, A5, A6);

/// Registry of callable methods, filled before serving and read-only after.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, Arc<dyn Method>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed function. A later registration under the same name
    /// replaces the earlier one.
    pub fn add_method<Args, F>(&mut self, name: impl Into<String>, f: F)
    where
        F: IntoMethod<Args>,
    {
        self.add_raw(name, f.into_method());
    }

    /// Register a hand-written [`Method`].
    pub fn add_raw(&mut self, name: impl Into<String>, method: Arc<dyn Method>) {
        self.methods.insert(name.into(), method);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Method>> {
        self.methods.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Look up and run `name`, mapping every outcome to a response.
    pub async fn dispatch(&self, name: &str, params: Vec<Value>) -> Response {
        let Some(method) = self.get(name) else {
            debug!(method = %name, "Method not found");
            return Response::method_not_found();
        };

        if params.len() != method.arity() {
            debug!(
                method = %name,
                expected = method.arity(),
                got = params.len(),
                "Arity mismatch"
            );
            return Response::invalid_params();
        }

        // Methods are plain synchronous code; keep them off the reactor.
        let result = tokio::task::spawn_blocking(move || method.call(params)).await;

        match result {
            Ok(Ok(value)) => Response::Success(value),
            Ok(Err(MethodError::InvalidParams(msg))) => {
                debug!(method = %name, reason = %msg, "Invalid parameters");
                Response::invalid_params()
            }
            Ok(Err(MethodError::Failed(msg))) => {
                warn!(method = %name, error = %msg, "Method failed");
                Response::internal_error()
            }
            Err(e) => {
                warn!(method = %name, error = %e, "Method panicked");
                Response::internal_error()
            }
        }
    }
}
