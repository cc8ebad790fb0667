//! Arithmetic, comparison, and logic natives.
//!
//! All operators are infix and fold strictly left to right (the evaluator
//! has no precedence table). Arithmetic promotes to decimal when either
//! operand is decimal; integer arithmetic is overflow-checked. Equality
//! follows structural `equals` (which already promotes numerically);
//! ordering comparisons go through `value_cmp` and report `NotComparable`
//! for mixed non-numeric kinds.

use std::cmp::Ordering;

use super::{NativeDef, arg};
use crate::{
    args::{ArgValues, Refinements},
    decimal::Decimal,
    error::{ErrorValue, RunResult},
    eval::Evaluator,
    heap::HeapData,
    value::{Value, value_cmp},
};

pub(crate) static NATIVES: &[NativeDef] = &[
    NativeDef::infix("+", &[arg("value1"), arg("value2")], "Adds two numbers.", na_add),
    NativeDef::infix("-", &[arg("value1"), arg("value2")], "Subtracts the second number from the first.", na_subtract),
    NativeDef::infix("*", &[arg("value1"), arg("value2")], "Multiplies two numbers.", na_multiply),
    NativeDef::infix("/", &[arg("value1"), arg("value2")], "Divides the first number by the second.", na_divide),
    NativeDef::infix("=", &[arg("value1"), arg("value2")], "Returns true when the values are equal.", na_equal),
    NativeDef::infix("<>", &[arg("value1"), arg("value2")], "Returns true when the values differ.", na_not_equal),
    NativeDef::infix("<", &[arg("value1"), arg("value2")], "Returns true when the first value is lesser.", na_less),
    NativeDef::infix(">", &[arg("value1"), arg("value2")], "Returns true when the first value is greater.", na_greater),
    NativeDef::infix(
        "<=",
        &[arg("value1"), arg("value2")],
        "Returns true when the first value is lesser or equal.",
        na_less_equal,
    ),
    NativeDef::infix(
        ">=",
        &[arg("value1"), arg("value2")],
        "Returns true when the first value is greater or equal.",
        na_greater_equal,
    ),
    NativeDef::infix("and", &[arg("value1"), arg("value2")], "Logical and of two values.", na_and),
    NativeDef::infix("or", &[arg("value1"), arg("value2")], "Logical or of two values.", na_or),
    NativeDef::prefix("not", &[arg("value")], "Logical complement of a value's truthiness.", na_not),
];

/// The numeric payload of an operand, promoted for mixed arithmetic.
enum Number {
    Int(i64),
    Dec(Decimal),
}

/// Extracts a numeric operand, or reports `<op>-type-error`.
fn number_operand(ev: &Evaluator<'_>, op: &str, a: &Value, b: &Value, which: &Value) -> RunResult<Number> {
    match which {
        Value::Int(i) => Ok(Number::Int(*i)),
        Value::Ref(id) => match ev.heap.get(*id) {
            HeapData::Decimal(d) => Ok(Number::Dec(d.clone())),
            _ => Err(ErrorValue::math_type(op, a.kind(ev.heap), b.kind(ev.heap))),
        },
        _ => Err(ErrorValue::math_type(op, a.kind(ev.heap), b.kind(ev.heap))),
    }
}

/// Gathers both operands, releasing the argument values.
fn numeric_pair(ev: &mut Evaluator<'_>, op: &str, args: ArgValues) -> RunResult<(Number, Number)> {
    let (a, b) = args.get_two(op, ev.heap)?;
    let pair = match number_operand(ev, op, &a, &b, &a) {
        Ok(x) => number_operand(ev, op, &a, &b, &b).map(|y| (x, y)),
        Err(err) => Err(err),
    };
    a.drop_with_heap(ev.heap);
    b.drop_with_heap(ev.heap);
    pair
}

fn arith(
    ev: &mut Evaluator<'_>,
    op: &str,
    args: ArgValues,
    int_op: fn(i64, i64) -> Option<i64>,
    dec_op: fn(&Decimal, &Decimal) -> Option<Decimal>,
) -> RunResult<Value> {
    match numeric_pair(ev, op, args)? {
        (Number::Int(a), Number::Int(b)) => int_op(a, b).map(Value::Int).ok_or_else(|| ErrorValue::overflow(op)),
        (a, b) => {
            let a = match a {
                Number::Int(i) => Decimal::from_int(i),
                Number::Dec(d) => d,
            };
            let b = match b {
                Number::Int(i) => Decimal::from_int(i),
                Number::Dec(d) => d,
            };
            let result = dec_op(&a, &b).ok_or_else(ErrorValue::div_by_zero)?;
            Ok(ev.heap.alloc_decimal(result))
        }
    }
}

fn na_add(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    arith(ev, "+", args, i64::checked_add, |a, b| Some(a.add(b)))
}

fn na_subtract(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    arith(ev, "-", args, i64::checked_sub, |a, b| Some(a.sub(b)))
}

fn na_multiply(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    arith(ev, "*", args, i64::checked_mul, |a, b| Some(a.mul(b)))
}

/// Division: exact integer division stays integral; a non-exact integer
/// quotient promotes to decimal.
fn na_divide(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    match numeric_pair(ev, "/", args)? {
        (Number::Int(a), Number::Int(b)) => {
            if b == 0 {
                return Err(ErrorValue::div_by_zero());
            }
            if a % b == 0 {
                // i64::MIN / -1 is the one overflowing case.
                a.checked_div(b).map(Value::Int).ok_or_else(|| ErrorValue::overflow("/"))
            } else {
                let result = Decimal::from_int(a)
                    .div(&Decimal::from_int(b))
                    .expect("divisor checked non-zero");
                Ok(ev.heap.alloc_decimal(result))
            }
        }
        (a, b) => {
            let a = match a {
                Number::Int(i) => Decimal::from_int(i),
                Number::Dec(d) => d,
            };
            let b = match b {
                Number::Int(i) => Decimal::from_int(i),
                Number::Dec(d) => d,
            };
            let result = a.div(&b).ok_or_else(ErrorValue::div_by_zero)?;
            Ok(ev.heap.alloc_decimal(result))
        }
    }
}

fn na_equal(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (a, b) = args.get_two("=", ev.heap)?;
    let equal = a.equals(&b, ev.heap);
    a.drop_with_heap(ev.heap);
    b.drop_with_heap(ev.heap);
    Ok(Value::Logic(equal))
}

fn na_not_equal(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (a, b) = args.get_two("<>", ev.heap)?;
    let equal = a.equals(&b, ev.heap);
    a.drop_with_heap(ev.heap);
    b.drop_with_heap(ev.heap);
    Ok(Value::Logic(!equal))
}

fn compare(ev: &mut Evaluator<'_>, op: &str, args: ArgValues, accept: fn(Ordering) -> bool) -> RunResult<Value> {
    let (a, b) = args.get_two(op, ev.heap)?;
    let ordering = value_cmp(&a, &b, ev.heap);
    let result = match ordering {
        Some(ordering) => Ok(Value::Logic(accept(ordering))),
        None => Err(ErrorValue::not_comparable(a.kind(ev.heap), b.kind(ev.heap))),
    };
    a.drop_with_heap(ev.heap);
    b.drop_with_heap(ev.heap);
    result
}

fn na_less(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    compare(ev, "<", args, Ordering::is_lt)
}

fn na_greater(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    compare(ev, ">", args, Ordering::is_gt)
}

fn na_less_equal(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    compare(ev, "<=", args, Ordering::is_le)
}

fn na_greater_equal(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    compare(ev, ">=", args, Ordering::is_ge)
}

fn na_and(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (a, b) = args.get_two("and", ev.heap)?;
    let result = a.is_truthy() && b.is_truthy();
    a.drop_with_heap(ev.heap);
    b.drop_with_heap(ev.heap);
    Ok(Value::Logic(result))
}

fn na_or(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (a, b) = args.get_two("or", ev.heap)?;
    let result = a.is_truthy() || b.is_truthy();
    a.drop_with_heap(ev.heap);
    b.drop_with_heap(ev.heap);
    Ok(Value::Logic(result))
}

fn na_not(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let value = args.get_one("not", ev.heap)?;
    let result = !value.is_truthy();
    value.drop_with_heap(ev.heap);
    Ok(Value::Logic(result))
}
