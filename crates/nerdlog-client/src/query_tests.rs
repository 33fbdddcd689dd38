use super::*;

fn sample() -> QueryFull {
    QueryFull { lstreams: "web1,web2".into(), time: "2024-03-26-00:00,2024-03-27-00:00".into(), pattern: "oops error".into(), select_query: "level=error".into() }
}

#[test]
fn marshal_then_unmarshal_round_trips() {
    let q = sample();
    let marshaled = q.marshal();
    let parsed = QueryFull::unmarshal(&marshaled).unwrap();
    assert_eq!(parsed, q);
}

#[test]
fn marshal_escapes_embedded_spaces_and_quotes() {
    let q = QueryFull { pattern: "it's \"odd\"".into(), ..sample() };
    let marshaled = q.marshal();
    let parsed = QueryFull::unmarshal(&marshaled).unwrap();
    assert_eq!(parsed.pattern, "it's \"odd\"");
}

#[test]
fn unmarshal_accepts_flags_in_any_order() {
    let cmd = "nerdlog --pattern oops --selquery level=error --time 2024 --lstreams web1";
    let parsed = QueryFull::unmarshal(cmd).unwrap();
    assert_eq!(parsed.lstreams, "web1");
    assert_eq!(parsed.time, "2024");
    assert_eq!(parsed.pattern, "oops");
    assert_eq!(parsed.select_query, "level=error");
}

#[test]
fn unmarshal_defaults_selquery_when_absent() {
    let cmd = "nerdlog --lstreams web1 --time 2024 --pattern oops";
    let parsed = QueryFull::unmarshal(cmd).unwrap();
    assert_eq!(parsed.select_query, DEFAULT_SELECT_QUERY);
}

#[test]
fn unmarshal_rejects_wrong_program_name() {
    let err = QueryFull::unmarshal("notnerdlog --lstreams a --time b --pattern c").unwrap_err();
    assert!(matches!(err, QueryParseError::WrongProgram { .. }));
}

#[test]
fn unmarshal_rejects_missing_mandatory_flag() {
    let err = QueryFull::unmarshal("nerdlog --lstreams web1 --time 2024").unwrap_err();
    assert_eq!(err, QueryParseError::MissingFlag { flag: "--pattern" });
}

#[test]
fn unmarshal_rejects_empty_command() {
    assert_eq!(QueryFull::unmarshal("").unwrap_err(), QueryParseError::Empty);
}

#[test]
fn unmarshal_propagates_shell_parse_errors() {
    let err = QueryFull::unmarshal("nerdlog --lstreams 'unterminated").unwrap_err();
    assert!(matches!(err, QueryParseError::Shell(_)));
}
