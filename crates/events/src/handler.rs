/// Execute an aggregate command deterministically (no IO).
///
/// 1. **Decide**: `aggregate.handle(command)` returns events without mutating state.
/// 2. **Evolve**: each event is applied to the aggregate.
///
/// Returns the events so the caller can append them to the audit trail. On error the
/// aggregate is untouched.
pub fn execute<A>(
    aggregate: &mut A,
    command: &A::Command,
) -> Result<Vec<A::Event>, A::Error>
where
    A: toolroom_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
