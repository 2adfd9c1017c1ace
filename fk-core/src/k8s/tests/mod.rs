mod util_test;

use fk_testutils::*;

use super::*;
