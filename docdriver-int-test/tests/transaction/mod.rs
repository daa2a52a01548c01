mod failure_test;
mod session_test;
mod tagging_test;
mod transaction_test;
