//! Parsing of host function arguments out of the interpreter's value list.

use wasmi::{FromValue, RuntimeArgs, Trap};

use crate::execution::Error;

fn nth<T: FromValue>(args: &RuntimeArgs, index: usize) -> Result<T, Trap> {
    args.nth_checked(index).map_err(|e| {
        Error::Interpreter(format!("invalid host function argument {}: {}", index, e)).into()
    })
}

/// Tuple view over [`RuntimeArgs`]: one `parse` per arity.
pub(crate) trait Args: Sized {
    fn parse(args: &RuntimeArgs) -> Result<Self, Trap>;
}

impl<A> Args for (A,)
where
    A: FromValue,
{
    fn parse(args: &RuntimeArgs) -> Result<Self, Trap> {
        Ok((nth(args, 0)?,))
    }
}

impl<A, B> Args for (A, B)
where
    A: FromValue,
    B: FromValue,
{
    fn parse(args: &RuntimeArgs) -> Result<Self, Trap> {
        Ok((nth(args, 0)?, nth(args, 1)?))
    }
}

impl<A, B, C> Args for (A, B, C)
where
    A: FromValue,
    B: FromValue,
    C: FromValue,
{
    fn parse(args: &RuntimeArgs) -> Result<Self, Trap> {
        Ok((nth(args, 0)?, nth(args, 1)?, nth(args, 2)?))
    }
}
